//! Steps: virtual disk creation and compaction.

use super::{log_step_error, step_start};
use crate::build::BuildState;
use crate::pipeline::{PipelineStep, StepAction};
use async_trait::async_trait;
use vmforge_shared::errors::VmforgeResult;

/// Creates the primary and additional disks named by the device placement.
///
/// Cleanup deletes the disk files when the build did not succeed.
pub struct CreateDisksStep;

#[async_trait]
impl PipelineStep<BuildState> for CreateDisksStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let config = state.config.clone();
        let output_dir = state.require_output_dir()?.to_path_buf();

        let placement = config.placement();
        let sizes = std::iter::once(config.disk_size_mb)
            .chain(config.additional_disk_sizes_mb.iter().copied());

        state.collaborators.ui.say("Creating required virtual machine disks");
        for (file_name, size_mb) in placement.file_names().into_iter().zip(sizes) {
            let path = output_dir.join(file_name);
            tracing::debug!(
                vm_name = %vm_name,
                disk = %path.display(),
                size_mb,
                "Creating disk"
            );
            state
                .collaborators
                .driver
                .create_disk(
                    &path,
                    size_mb,
                    config.disk_adapter_type,
                    config.disk_type_id(),
                )
                .await
                .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
            state.disk_paths.push(path);
        }

        state.placement = Some(placement);
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if !state.signals.failed() {
            return Ok(());
        }
        for path in state.disk_paths.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(disk = %path.display(), error = %e, "Failed to remove disk");
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "create_disks"
    }
}

/// Compacts every disk the build created.
pub struct CompactDiskStep;

#[async_trait]
impl PipelineStep<BuildState> for CompactDiskStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);

        state.collaborators.ui.say("Compacting all attached virtual disks...");
        for (i, disk) in state.disk_paths.iter().enumerate() {
            state
                .collaborators
                .ui
                .message(&format!("Compacting virtual disk {}", i + 1));
            state
                .collaborators
                .driver
                .compact_disk(disk)
                .await
                .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        }
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "compact_disk"
    }
}
