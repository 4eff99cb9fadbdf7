//! Steps: output directory and SSH key generation.

use super::{log_step_error, step_start};
use crate::build::BuildState;
use crate::pipeline::{PipelineStep, StepAction};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Creates the output directory.
///
/// A non-empty existing directory is an error unless `force` is set, in
/// which case it is wiped first. Cleanup removes the directory when the
/// build did not succeed and this step created it.
pub struct OutputDirStep;

#[async_trait]
impl PipelineStep<BuildState> for OutputDirStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);

        let dir = state.config.output_dir();
        prepare_output_dir(&dir, state.config.force)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        state
            .collaborators
            .ui
            .say(&format!("Created output directory {}", dir.display()));
        state.output_dir = Some(dir);
        state.created_output_dir = true;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if !state.created_output_dir || !state.signals.failed() {
            return Ok(());
        }
        if let Some(ref dir) = state.output_dir {
            state.collaborators.ui.say("Deleting output directory...");
            tokio::fs::remove_dir_all(dir).await.map_err(|e| {
                VmforgeError::Storage(format!("failed to remove {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "output_dir"
    }
}

fn prepare_output_dir(dir: &Path, force: bool) -> VmforgeResult<()> {
    if dir.exists() {
        let non_empty = std::fs::read_dir(dir)?.next().is_some();
        if non_empty && !force {
            return Err(VmforgeError::Storage(format!(
                "output directory {} already exists and is not empty; use force to overwrite",
                dir.display()
            )));
        }
        if non_empty {
            tracing::info!(dir = %dir.display(), "Removing existing output directory");
            std::fs::remove_dir_all(dir)?;
        }
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        VmforgeError::Storage(format!("failed to create {}: {}", dir.display(), e))
    })
}

/// Generates a temporary SSH key pair through the communicator.
pub struct SshKeygenStep;

#[async_trait]
impl PipelineStep<BuildState> for SshKeygenStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);

        let communicator = state.collaborators.communicator.clone().ok_or_else(|| {
            VmforgeError::Internal("ssh_keygen requires a communicator".to_string())
        })?;

        state.collaborators.ui.say("Creating temporary SSH key for instance...");
        let key_pair = communicator
            .generate_key_pair()
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        let key_file = write_private_key(&key_pair.private_key)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        tracing::debug!(
            vm_name = %vm_name,
            path = %key_file.display(),
            public_key = %key_pair.public_key.trim_end(),
            "Wrote temporary private key"
        );

        state.ssh_key_file = Some(key_file);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if let Some(key_file) = state.ssh_key_file.take() {
            key_file.close()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ssh_keygen"
    }
}

fn write_private_key(private_key: &str) -> VmforgeResult<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("vmforge-ssh-")
        .suffix(".pem")
        .tempfile()
        .map_err(|e| VmforgeError::Storage(format!("failed to create key file: {}", e)))?;
    file.write_all(private_key.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}
