//! Build result handed back to the host.

use crate::config::ExportFormat;
use crate::pipeline::StepMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// What a successful build produced.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub build_id: String,
    pub vm_name: String,
    pub output_dir: PathBuf,
    /// Files left in the output directory, sorted.
    pub files: Vec<PathBuf>,
    pub format: Option<ExportFormat>,
    pub export_skipped: bool,
    /// Whether the machine is still registered with the hypervisor.
    pub keep_registered: bool,
    pub remote: bool,
    pub step_timings: Vec<StepMetrics>,
    pub total_duration_ms: u128,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Artifact {
    /// Short human-readable summary.
    pub fn describe(&self) -> String {
        match self.format {
            Some(format) if !self.export_skipped => format!(
                "VM files in directory: {} (exported as {})",
                self.output_dir.display(),
                format.as_str()
            ),
            _ => format!("VM files in directory: {}", self.output_dir.display()),
        }
    }
}

/// Terminal state of a build that did not fail.
#[derive(Debug)]
pub enum BuildOutcome {
    Succeeded {
        artifact: Artifact,
        warnings: Vec<String>,
    },
    Cancelled,
    Halted,
}

impl BuildOutcome {
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            BuildOutcome::Succeeded { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded { .. })
    }
}
