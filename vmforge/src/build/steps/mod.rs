//! Build steps.
//!
//! Each step reads what earlier steps left in [`BuildState`], does one
//! thing to the outside world, and records its outputs for later steps.
//! Cleanup undoes only what the step itself created.

mod disk;
mod finalize;
mod machine;
mod media;
mod setup;
mod vmx;

pub use disk::{CompactDiskStep, CreateDisksStep};
pub use finalize::{CleanFilesStep, ExportStep};
pub(crate) use finalize::list_files;
pub use machine::{
    ConnectStep, ProvisionStep, RegisterStep, RunStep, ShutdownStep, SuppressMessagesStep,
    TypeBootCommandStep, UnregisterStep,
};
pub use media::{CreateCdStep, CreateFloppyStep, DownloadIsoStep, RemoteUploadStep, UploadKind};
pub use setup::{OutputDirStep, SshKeygenStep};
pub use vmx::{CleanVmxStep, CloneVmxStep, ConfigureVmxStep, ConfigureVncStep, CreateVmxStep};

use super::BuildState;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Log step entry and return the VM name for later log lines.
pub(crate) fn step_start(state: &BuildState, step_name: &str) -> String {
    let vm_name = state.vm_name().to_string();
    tracing::debug!(
        build_id = %state.build_id,
        vm_name = %vm_name,
        step = step_name,
        "Step started"
    );
    vm_name
}

pub(crate) fn log_step_error(vm_name: &str, step_name: &str, err: &VmforgeError) {
    if err.is_cancelled() {
        tracing::info!(vm_name = %vm_name, step = step_name, "Step cancelled");
    } else {
        tracing::error!(vm_name = %vm_name, step = step_name, error = %err, "Step failed");
    }
}

/// Run `fut` until it completes or `cancel` fires.
pub(crate) async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> VmforgeResult<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VmforgeError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Sleep for `duration`, returning `Err(Cancelled)` early on cancellation.
pub(crate) async fn cancellable_sleep(
    cancel: &CancellationToken,
    duration: std::time::Duration,
) -> VmforgeResult<()> {
    cancellable(cancel, tokio::time::sleep(duration)).await
}
