//! Steps: install medium, floppy and CD staging, remote uploads.

use super::{log_step_error, step_start};
use crate::build::BuildState;
use crate::pipeline::{PipelineStep, StepAction};
use async_trait::async_trait;
use std::path::PathBuf;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Downloads and verifies the install ISO.
pub struct DownloadIsoStep;

#[async_trait]
impl PipelineStep<BuildState> for DownloadIsoStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let cancel = state.cancel_token();
        let config = state.config.clone();

        state.collaborators.ui.say("Retrieving ISO");
        let iso_path = state
            .collaborators
            .stager
            .download_iso(&config.iso_urls, config.iso_checksum.as_deref(), &cancel)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        tracing::info!(vm_name = %vm_name, iso = %iso_path.display(), "ISO staged");
        state.iso_path = Some(iso_path);
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "download_iso"
    }
}

/// Builds a floppy image from the configured files.
pub struct CreateFloppyStep;

#[async_trait]
impl PipelineStep<BuildState> for CreateFloppyStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let config = state.config.clone();

        state.collaborators.ui.say("Creating floppy disk...");
        let work_dir = scratch_dir("vmforge-floppy-")?;
        let path = state
            .collaborators
            .stager
            .create_floppy(&config.floppy_files, work_dir.path())
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        state.floppy_path = Some(path);
        state.floppy_dir = Some(work_dir);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if let Some(dir) = state.floppy_dir.take() {
            dir.close()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "create_floppy"
    }
}

/// Builds an ISO image from the configured CD files.
pub struct CreateCdStep;

#[async_trait]
impl PipelineStep<BuildState> for CreateCdStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let config = state.config.clone();

        state.collaborators.ui.say("Creating CD disk...");
        let work_dir = scratch_dir("vmforge-cd-")?;
        let path = state
            .collaborators
            .stager
            .create_cd(&config.cd_files, config.cd_label.as_deref(), work_dir.path())
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        state.cd_path = Some(path);
        state.cd_dir = Some(work_dir);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if let Some(dir) = state.cd_dir.take() {
            dir.close()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "create_cd"
    }
}

fn scratch_dir(prefix: &str) -> VmforgeResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| VmforgeError::Storage(format!("failed to create scratch directory: {}", e)))
}

/// Which staged file a [`RemoteUploadStep`] uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Floppy,
    Cd,
    Iso,
}

/// Uploads a staged file to the remote datastore and points the build at
/// the remote copy.
pub struct RemoteUploadStep {
    pub kind: UploadKind,
}

impl RemoteUploadStep {
    pub fn new(kind: UploadKind) -> Self {
        Self { kind }
    }

    fn staged(&self, state: &BuildState) -> VmforgeResult<PathBuf> {
        let path = match self.kind {
            UploadKind::Floppy => state.require_floppy_path()?,
            UploadKind::Cd => state.require_cd_path()?,
            UploadKind::Iso => state.require_iso_path()?,
        };
        Ok(path.to_path_buf())
    }

    fn slot<'a>(&self, state: &'a mut BuildState) -> &'a mut Option<PathBuf> {
        match self.kind {
            UploadKind::Floppy => &mut state.floppy_path,
            UploadKind::Cd => &mut state.cd_path,
            UploadKind::Iso => &mut state.iso_path,
        }
    }
}

#[async_trait]
impl PipelineStep<BuildState> for RemoteUploadStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);

        let remote = state.config.remote.clone().ok_or_else(|| {
            VmforgeError::Internal(format!("{} requires a remote host", step_name))
        })?;
        let local = self
            .staged(state)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        let file_name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VmforgeError::Storage(format!("cannot upload {}: no file name", local.display()))
            })?;

        let remote_path = remote.datastore_path(&file_name);
        state
            .collaborators
            .ui
            .say(&format!("Uploading {} => {}", file_name, remote_path));
        let uploaded = state
            .collaborators
            .driver
            .upload(&local, &remote_path)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        *self.slot(state) = Some(uploaded);
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        match self.kind {
            UploadKind::Floppy => "remote_upload_floppy",
            UploadKind::Cd => "remote_upload_cd",
            UploadKind::Iso => "remote_upload_iso",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{Recorder, collaborators, iso_config};
    use crate::config::{BuildConfig, RemoteConfig};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn state_with(config: BuildConfig) -> (BuildState, Arc<Recorder>) {
        let recorder = Recorder::new();
        let state = BuildState::new(
            Arc::new(config),
            collaborators(&recorder),
            CancellationToken::new(),
        );
        (state, recorder)
    }

    #[tokio::test]
    async fn test_download_sets_iso_path() {
        let root = tempfile::tempdir().unwrap();
        let (mut state, _) = state_with(iso_config(root.path()));
        DownloadIsoStep.run(&mut state).await.unwrap();
        assert_eq!(
            state.require_iso_path().unwrap(),
            std::path::Path::new("/cache/install.iso")
        );
    }

    #[tokio::test]
    async fn test_download_observes_cancellation() {
        let root = tempfile::tempdir().unwrap();
        let (mut state, _) = state_with(iso_config(root.path()));
        state.signals.cancel_token().cancel();
        let err = DownloadIsoStep.run(&mut state).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(state.iso_path.is_none());
    }

    #[tokio::test]
    async fn test_floppy_scratch_removed_on_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let (mut state, _) = state_with(iso_config(root.path()));
        CreateFloppyStep.run(&mut state).await.unwrap();
        let floppy = state.floppy_path.clone().unwrap();
        assert!(floppy.exists());

        CreateFloppyStep.cleanup(&mut state).await.unwrap();
        assert!(!floppy.exists());
    }

    #[tokio::test]
    async fn test_upload_rewrites_path() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            remote: Some(RemoteConfig {
                host: "esxi.local".into(),
                datastore: "ds1".into(),
                cache_directory: Some("cache".into()),
            }),
            ..iso_config(root.path())
        };
        let (mut state, recorder) = state_with(config);
        state.iso_path = Some(PathBuf::from("/local/install.iso"));

        let step = RemoteUploadStep::new(UploadKind::Iso);
        step.run(&mut state).await.unwrap();
        assert_eq!(
            state.iso_path,
            Some(PathBuf::from("/vmfs/volumes/ds1/cache/install.iso"))
        );
        assert!(recorder.called("upload"));
    }

    #[tokio::test]
    async fn test_upload_without_staged_media_fails() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            remote: Some(RemoteConfig {
                host: "esxi.local".into(),
                datastore: "ds1".into(),
                cache_directory: None,
            }),
            ..iso_config(root.path())
        };
        let (mut state, recorder) = state_with(config);

        for (kind, producer) in [
            (UploadKind::Floppy, "create_floppy"),
            (UploadKind::Cd, "create_cd"),
            (UploadKind::Iso, "download_iso"),
        ] {
            let err = RemoteUploadStep::new(kind).run(&mut state).await.unwrap_err();
            assert!(matches!(err, VmforgeError::Internal(_)));
            assert!(err.to_string().contains(producer), "{}", err);
        }
        assert!(!recorder.called("upload"));
    }
}
