//! User-visible build output.

/// Output sink for progress messages shown to the user.
pub trait Ui: Send + Sync {
    /// Top-level progress line.
    fn say(&self, message: &str);

    /// Detail line under the current step.
    fn message(&self, message: &str);

    fn error(&self, message: &str);
}

/// Forwards UI output to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        tracing::info!(target: "vmforge::ui", "==> {}", message);
    }

    fn message(&self, message: &str) {
        tracing::info!(target: "vmforge::ui", "    {}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "vmforge::ui", "{}", message);
    }
}
