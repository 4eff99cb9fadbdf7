//! Build orchestration.
//!
//! ## Architecture
//!
//! The step list is built once per build from the configuration. Optional
//! steps are either in the list or not; no step checks whether it is
//! enabled.
//!
//! ```text
//! ISO (install from medium):
//!   output_dir → [ssh_keygen] → download_iso → [create_floppy] → [create_cd]
//!   → [remote_upload_floppy/cd/iso] → create_disks → create_vmx
//!   → configure_vmx → suppress_messages → [configure_vnc] → [register] → run
//!   → [type_boot_command] → [connect → provision] → shutdown → clean_files
//!   → [compact_disk] → clean_vmx → [export] → [unregister]
//!
//! Import (clone existing machine):
//!   output_dir → [ssh_keygen] → [create_floppy] → [create_cd]
//!   → [remote_upload_floppy/cd] → clone_vmx → configure_vmx → ... (as above)
//! ```
//!
//! Steps share a [`BuildState`]. After the pipeline stops, the state's
//! signals decide the outcome: error, then cancelled, then halted, then
//! success.

mod artifact;
mod state;
mod steps;
#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{Artifact, BuildOutcome};
pub use state::BuildState;
pub use steps::UploadKind;

use crate::config::{BuildConfig, BuildVariant, CommunicatorKind};
use crate::driver::Collaborators;
use crate::pipeline::{BoxedStep, ExecutionPlan, PipelineExecutor, PipelineMetrics, Terminal};
use std::sync::Arc;
use std::time::Instant;
use steps::{
    CleanFilesStep, CleanVmxStep, CloneVmxStep, CompactDiskStep, ConfigureVmxStep,
    ConfigureVncStep, ConnectStep, CreateCdStep, CreateDisksStep, CreateFloppyStep, CreateVmxStep,
    DownloadIsoStep, ExportStep, OutputDirStep, ProvisionStep, RegisterStep, RemoteUploadStep,
    RunStep, ShutdownStep, SshKeygenStep, SuppressMessagesStep, TypeBootCommandStep,
    UnregisterStep,
};
use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

// ============================================================================
// EXECUTION PLAN
// ============================================================================

/// Ordered step list for `config`.
pub fn build_plan(config: &BuildConfig) -> ExecutionPlan<BuildState> {
    let variant = config.variant();
    let mut plan: Vec<BoxedStep<BuildState>> = vec![Box::new(OutputDirStep)];

    if config.generates_ssh_key() {
        plan.push(Box::new(SshKeygenStep));
    }
    if variant == BuildVariant::Iso {
        plan.push(Box::new(DownloadIsoStep));
    }
    if !config.floppy_files.is_empty() {
        plan.push(Box::new(CreateFloppyStep));
    }
    if !config.cd_files.is_empty() {
        plan.push(Box::new(CreateCdStep));
    }

    if config.is_remote() {
        if !config.floppy_files.is_empty() {
            plan.push(Box::new(RemoteUploadStep::new(UploadKind::Floppy)));
        }
        if !config.cd_files.is_empty() {
            plan.push(Box::new(RemoteUploadStep::new(UploadKind::Cd)));
        }
        if variant == BuildVariant::Iso {
            plan.push(Box::new(RemoteUploadStep::new(UploadKind::Iso)));
        }
    }

    match variant {
        BuildVariant::Iso => {
            plan.push(Box::new(CreateDisksStep));
            plan.push(Box::new(CreateVmxStep));
        }
        BuildVariant::Import => plan.push(Box::new(CloneVmxStep)),
    }

    plan.push(Box::new(ConfigureVmxStep));
    plan.push(Box::new(SuppressMessagesStep));
    if config.vnc_enabled() {
        plan.push(Box::new(ConfigureVncStep));
    }
    if config.is_remote() {
        plan.push(Box::new(RegisterStep));
    }
    plan.push(Box::new(RunStep));
    if config.vnc_enabled() && !config.boot_command.is_empty() {
        plan.push(Box::new(TypeBootCommandStep));
    }
    if config.communicator != CommunicatorKind::None {
        plan.push(Box::new(ConnectStep));
        plan.push(Box::new(ProvisionStep));
    }
    plan.push(Box::new(ShutdownStep));
    plan.push(Box::new(CleanFilesStep));
    if !config.skip_compaction {
        plan.push(Box::new(CompactDiskStep));
    }
    plan.push(Box::new(CleanVmxStep));
    if config.exports() {
        plan.push(Box::new(ExportStep));
    }
    if config.is_remote() && !config.keep_registered {
        plan.push(Box::new(UnregisterStep));
    }

    ExecutionPlan::new(plan)
}

fn log_pipeline_metrics(vm_name: &str, metrics: &PipelineMetrics) {
    for step in &metrics.steps {
        tracing::debug!(vm_name, step = %step.name, duration_ms = step.duration_ms, "Step timing");
    }
    tracing::info!(
        vm_name,
        steps = metrics.steps.len(),
        total_ms = metrics.total_duration_ms,
        cleanup_ms = metrics.cleanup_duration_ms,
        "Build pipeline finished"
    );
}

// ============================================================================
// BUILDER
// ============================================================================

/// Runs one image build.
///
/// # Example
///
/// ```ignore
/// let builder = Builder::new(config, collaborators)?;
/// match builder.run(cancel).await? {
///     BuildOutcome::Succeeded { artifact, warnings } => { ... }
///     BuildOutcome::Cancelled | BuildOutcome::Halted => { ... }
/// }
/// ```
pub struct Builder {
    config: Arc<BuildConfig>,
    collaborators: Collaborators,
    warnings: Vec<String>,
}

impl Builder {
    /// Validate `config` against itself and the supplied collaborators.
    ///
    /// Nothing touches the outside world until [`Builder::run`].
    pub fn new(config: BuildConfig, collaborators: Collaborators) -> VmforgeResult<Self> {
        let warnings = config.prepare()?;

        let mut errs = Vec::new();
        if config.communicator != CommunicatorKind::None && collaborators.communicator.is_none() {
            errs.push(format!(
                "communicator {:?} requires a communicator implementation",
                config.communicator
            ));
        }
        if config.vnc_enabled()
            && !config.boot_command.is_empty()
            && collaborators.typist.is_none()
        {
            errs.push("boot_command requires a boot typist".to_string());
        }
        if !errs.is_empty() {
            return Err(VmforgeError::InvalidConfig(errs));
        }

        Ok(Self {
            config: Arc::new(config),
            collaborators,
            warnings,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Warnings found while validating the configuration.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn plan(&self) -> ExecutionPlan<BuildState> {
        build_plan(&self.config)
    }

    /// Run the build to completion, cancellation, or failure.
    ///
    /// Step errors come back as `Err` after cleanup has run. Cancellation
    /// and halts are outcomes, not errors.
    pub async fn run(self, cancel: CancellationToken) -> VmforgeResult<BuildOutcome> {
        let total_start = Instant::now();
        let Builder {
            config,
            collaborators,
            warnings,
        } = self;
        let vm_name = config.vm_name.clone();

        collaborators.driver.verify().await?;
        if config.exports() {
            collaborators.driver.verify_export_tool().await?;
        }

        let plan = build_plan(&config);
        tracing::info!(vm_name = %vm_name, steps = ?plan.step_names(), "Starting build");

        let mut state = BuildState::new(Arc::clone(&config), collaborators, cancel);
        state.warnings = warnings;
        tracing::debug!(vm_name = %vm_name, build_id = %state.build_id, "Assigned build id");
        let metrics = PipelineExecutor::execute(plan, &mut state).await;
        log_pipeline_metrics(&vm_name, &metrics);

        match state.signals.take_terminal() {
            Terminal::Error(err) => {
                state.collaborators.ui.error(&format!("Build '{}' errored: {}", vm_name, err));
                Err(err)
            }
            Terminal::Cancelled => {
                state
                    .collaborators
                    .ui
                    .error(&format!("Build '{}' cancelled", vm_name));
                Ok(BuildOutcome::Cancelled)
            }
            Terminal::Halted => {
                state
                    .collaborators
                    .ui
                    .error(&format!("Build '{}' halted", vm_name));
                Ok(BuildOutcome::Halted)
            }
            Terminal::Success => {
                let output_dir = state.require_output_dir()?.to_path_buf();
                let artifact = Artifact {
                    build_id: state.build_id.clone(),
                    vm_name,
                    files: steps::list_files(&output_dir),
                    output_dir,
                    format: config.format,
                    export_skipped: !state.exported,
                    keep_registered: state.registered,
                    remote: config.is_remote(),
                    step_timings: metrics.steps,
                    total_duration_ms: total_start.elapsed().as_millis(),
                    started_at: state.started_at,
                    finished_at: chrono::Utc::now(),
                };
                state.collaborators.ui.say(&artifact.describe());
                Ok(BuildOutcome::Succeeded {
                    artifact,
                    warnings: state.warnings,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{Recorder, collaborators, iso_config};
    use crate::config::{ExportFormat, RemoteConfig};
    use std::path::PathBuf;

    fn remote() -> Option<RemoteConfig> {
        Some(RemoteConfig {
            host: "esxi.local".into(),
            datastore: "datastore1".into(),
            cache_directory: None,
        })
    }

    #[test]
    fn test_minimal_iso_plan() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            communicator: CommunicatorKind::None,
            skip_compaction: true,
            ..iso_config(root.path())
        };
        assert_eq!(
            build_plan(&config).step_names(),
            vec![
                "output_dir",
                "download_iso",
                "create_disks",
                "create_vmx",
                "configure_vmx",
                "suppress_messages",
                "run",
                "shutdown",
                "clean_files",
                "clean_vmx",
            ]
        );
    }

    #[test]
    fn test_full_remote_iso_plan() {
        let root = tempfile::tempdir().unwrap();
        let mut config = BuildConfig {
            floppy_files: vec![PathBuf::from("ks.cfg")],
            cd_files: vec![PathBuf::from("autounattend.xml")],
            boot_command: vec!["<enter>".into()],
            remote: remote(),
            format: Some(ExportFormat::Ova),
            ..iso_config(root.path())
        };
        config.vnc.disable = false;
        assert_eq!(
            build_plan(&config).step_names(),
            vec![
                "output_dir",
                "ssh_keygen",
                "download_iso",
                "create_floppy",
                "create_cd",
                "remote_upload_floppy",
                "remote_upload_cd",
                "remote_upload_iso",
                "create_disks",
                "create_vmx",
                "configure_vmx",
                "suppress_messages",
                "configure_vnc",
                "register",
                "run",
                "type_boot_command",
                "connect",
                "provision",
                "shutdown",
                "clean_files",
                "compact_disk",
                "clean_vmx",
                "export",
                "unregister",
            ]
        );
    }

    #[test]
    fn test_import_plan_clones_instead_of_creating() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            source_path: Some(root.path().join("source.vmx")),
            iso_urls: Vec::new(),
            remote: remote(),
            keep_registered: true,
            ..iso_config(root.path())
        };
        let plan = build_plan(&config);
        let names = plan.step_names();
        assert!(names.contains(&"clone_vmx"));
        assert!(!names.contains(&"download_iso"));
        assert!(!names.contains(&"create_disks"));
        assert!(!names.contains(&"create_vmx"));
        assert!(!names.contains(&"remote_upload_iso"));
        assert!(!names.contains(&"unregister"));
        assert!(names.contains(&"register"));
    }

    #[test]
    fn test_skip_export_drops_export_step() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            format: Some(ExportFormat::Ovf),
            skip_export: true,
            ..iso_config(root.path())
        };
        assert!(!build_plan(&config).step_names().contains(&"export"));
    }

    #[test]
    fn test_missing_typist_rejected() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Recorder::new();
        let mut collab = collaborators(&recorder);
        collab.typist = None;
        let mut config = BuildConfig {
            boot_command: vec!["<enter>".into()],
            ..iso_config(root.path())
        };
        config.vnc.disable = false;

        let err = Builder::new(config, collab).err().unwrap();
        assert!(err.to_string().contains("boot typist"));
    }

    #[tokio::test]
    async fn test_successful_build_produces_artifact() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Recorder::new();
        let config = BuildConfig {
            format: Some(ExportFormat::Ovf),
            ..iso_config(root.path())
        };
        let builder = Builder::new(config, collaborators(&recorder)).unwrap();

        let outcome = builder.run(CancellationToken::new()).await.unwrap();
        let BuildOutcome::Succeeded { artifact, warnings } = outcome else {
            panic!("expected success");
        };
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        assert_eq!(artifact.output_dir, root.path().join("out"));
        assert!(!artifact.export_skipped);
        assert!(!artifact.keep_registered);
        assert!(artifact.files.contains(&root.path().join("out/test-vm.vmx")));
        assert!(artifact.files.contains(&root.path().join("out/disk.vmdk")));
        assert!(artifact.files.contains(&root.path().join("out/machine.ovf")));
        assert_eq!(artifact.step_timings.first().unwrap().name, "output_dir");
        assert!(artifact.finished_at >= artifact.started_at);
        assert_eq!(artifact.build_id.len(), 26);
        assert!(recorder.called("verify_export_tool"));
    }

    #[tokio::test]
    async fn test_failed_step_returns_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Recorder::new();
        recorder.fail("compact_disk");
        let builder = Builder::new(iso_config(root.path()), collaborators(&recorder)).unwrap();

        let err = builder.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("compact_disk failed"));
        assert!(!root.path().join("out").exists());
        assert!(recorder.called("disconnect"));
    }

    #[tokio::test]
    async fn test_cancellation_is_an_outcome() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Recorder::new();
        let cancel = CancellationToken::new();
        recorder.cancel_during("create_disk", cancel.clone());
        let builder = Builder::new(iso_config(root.path()), collaborators(&recorder)).unwrap();

        let outcome = builder.run(cancel).await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Cancelled));
        assert!(!recorder.called("start"));
        assert!(!root.path().join("out").exists());
    }
}
