//! Step timing collected by the executor.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StepMetrics {
    pub name: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub steps: Vec<StepMetrics>,
    pub cleanup_duration_ms: u128,
}

impl PipelineMetrics {
    /// Names of the steps whose `run` was entered, in execution order.
    pub fn executed(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }
}
