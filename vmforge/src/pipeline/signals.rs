//! Terminal signals shared between steps and the executor.

use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::VmforgeError;

/// Context type a pipeline can run against.
pub trait StepContext: Send {
    fn signals(&self) -> &Signals;
    fn signals_mut(&mut self) -> &mut Signals;
}

/// Error / cancelled / halted flags plus the host's cancellation token.
///
/// At most one error is recorded; later errors are logged and dropped so the
/// first failure stays the build's reported cause.
#[derive(Debug, Default)]
pub struct Signals {
    cancel: CancellationToken,
    error: Option<VmforgeError>,
    cancelled: bool,
    halted: bool,
}

/// Terminal state of a finished pipeline, in reporting priority order.
#[derive(Debug)]
pub enum Terminal {
    Error(VmforgeError),
    Cancelled,
    Halted,
    Success,
}

impl Signals {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    /// Token for cancellable waits inside steps.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn record_error(&mut self, err: VmforgeError) {
        if let Some(ref existing) = self.error {
            tracing::warn!(error = %err, first = %existing, "Dropping secondary build error");
            return;
        }
        self.error = Some(err);
        self.halted = true;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn mark_halted(&mut self) {
        self.halted = true;
    }

    /// Latch the host token into the cancelled flag.
    pub fn observe_cancellation(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        self.cancelled
    }

    pub fn error(&self) -> Option<&VmforgeError> {
        self.error.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// True when the pipeline must not start another step.
    pub fn should_stop(&mut self) -> bool {
        self.observe_cancellation() || self.halted || self.error.is_some()
    }

    /// True when the build ended in anything other than success.
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.cancelled || self.halted
    }

    /// Consume the recorded state: error, then cancelled, then halted.
    pub fn take_terminal(&mut self) -> Terminal {
        if let Some(err) = self.error.take() {
            return Terminal::Error(err);
        }
        if self.cancelled {
            return Terminal::Cancelled;
        }
        if self.halted {
            return Terminal::Halted;
        }
        Terminal::Success
    }
}
