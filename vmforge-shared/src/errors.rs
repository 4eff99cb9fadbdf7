//! Error taxonomy for image builds.
//!
//! Errors fall into four groups by how the build reacts:
//! - configuration problems ([`VmforgeError::InvalidConfig`], [`VmforgeError::Config`])
//!   are reported before any step runs
//! - step failures (most other variants) end the build after cleanup
//! - [`VmforgeError::Cancelled`] is not a failure; the executor reports it
//!   as a cancelled build
//! - cleanup failures are logged by the executor and never surface here

use thiserror::Error;

/// Result alias used throughout vmforge.
pub type VmforgeResult<T> = Result<T, VmforgeError>;

#[derive(Debug, Error)]
pub enum VmforgeError {
    /// A single configuration problem.
    #[error("config: {0}")]
    Config(String),

    /// Every configuration problem found during validation.
    #[error("invalid configuration:\n{}", format_report(.0))]
    InvalidConfig(Vec<String>),

    /// Descriptor template could not be read, parsed, or rendered.
    #[error("template: {0}")]
    Template(String),

    /// Descriptor document could not be parsed or written.
    #[error("descriptor: {0}")]
    Descriptor(String),

    /// Hypervisor driver operation failed.
    #[error("driver: {0}")]
    Driver(String),

    #[error("network: {0}")]
    Network(String),

    /// Filesystem staging or cleanup failed.
    #[error("storage: {0}")]
    Storage(String),

    /// Remote command channel failed.
    #[error("communicator: {0}")]
    Communicator(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Programming error, e.g. a step read a value no earlier step produced.
    #[error("internal: {0}")]
    Internal(String),

    /// Cancellation observed at a poll point.
    #[error("build cancelled")]
    Cancelled,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl VmforgeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VmforgeError::Cancelled)
    }
}

fn format_report(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  * {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = VmforgeError::InvalidConfig(vec![
            "vm_name must not be empty".to_string(),
            "unknown disk adapter 'floppy'".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("invalid configuration:"));
        assert!(text.contains("  * vm_name must not be empty"));
        assert!(text.contains("  * unknown disk adapter 'floppy'"));
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> VmforgeResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(VmforgeError::Io(_))));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(VmforgeError::Cancelled.is_cancelled());
        assert!(!VmforgeError::Internal("x".into()).is_cancelled());
    }
}
