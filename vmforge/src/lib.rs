//! vmforge: builds desktop-hypervisor machine images.
//!
//! A build is an ordered list of steps run against one shared
//! [`build::BuildState`]. One of those steps synthesizes the hardware
//! descriptor (`.vmx`) from templates, device placement, and the
//! configuration. Everything that touches the hypervisor, the guest, or the
//! network goes through the traits in [`driver`].

pub mod build;
pub mod config;
pub mod driver;
pub mod pipeline;
pub mod vmx;

pub use build::{Artifact, BuildOutcome, Builder, build_plan};
pub use config::BuildConfig;
pub use vmforge_shared::errors::{VmforgeError, VmforgeResult};

use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use vmforge_shared::constants::{LOG_ENV, LOG_FILE_NAME};

/// Keeps the background log writer alive for the life of the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Send `tracing` output to `{log_dir}/vmforge.log`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// again, or after another subscriber was installed, is a no-op.
pub fn init_logging_for(log_dir: &Path) -> VmforgeResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(log_dir).map_err(|e| {
        VmforgeError::Storage(format!(
            "failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| VmforgeError::Config(format!("invalid log filter: {}", e)))?;

    register_to_tracing(non_blocking, env_filter);
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
