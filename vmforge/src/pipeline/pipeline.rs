//! Sequential pipeline executor.
//!
//! Runs an ordered step list against a shared context, stops at the first
//! halt, error, or observed cancellation, and then cleans up every step that
//! ran in reverse order.

use super::metrics::{PipelineMetrics, StepMetrics};
use super::signals::StepContext;
use super::step::{BoxedStep, StepAction};
use std::time::Instant;
use vmforge_shared::errors::VmforgeError;

pub struct ExecutionPlan<Ctx: Send> {
    steps: Vec<BoxedStep<Ctx>>,
}

impl<Ctx: Send> ExecutionPlan<Ctx> {
    pub fn new(steps: Vec<BoxedStep<Ctx>>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[BoxedStep<Ctx>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

/// Pipeline executor.
///
/// Never returns an error itself: the outcome lives in the context's
/// signals, which the caller reads with `take_terminal` afterwards.
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Execute a plan.
    ///
    /// Cancellation is checked before every step and after the last one;
    /// a step that is mid-flight is never interrupted by the executor.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: &mut Ctx) -> PipelineMetrics
    where
        Ctx: StepContext,
    {
        let total_start = Instant::now();
        let mut step_metrics = Vec::with_capacity(plan.len());
        let mut ran = 0usize;

        for step in plan.steps.iter() {
            if ctx.signals_mut().should_stop() {
                tracing::debug!(step = step.name(), "Pipeline stopping before step");
                break;
            }

            let name = step.name().to_string();
            tracing::debug!(step = %name, "Running step");
            let step_start = Instant::now();
            let result = step.run(ctx).await;
            ran += 1;
            step_metrics.push(StepMetrics {
                name: name.clone(),
                duration_ms: step_start.elapsed().as_millis(),
            });

            match result {
                Ok(StepAction::Continue) => {}
                Ok(StepAction::Halt) => {
                    tracing::info!(step = %name, "Step halted the build");
                    ctx.signals_mut().mark_halted();
                    break;
                }
                Err(VmforgeError::Cancelled) => {
                    tracing::info!(step = %name, "Step observed cancellation");
                    ctx.signals_mut().mark_cancelled();
                    break;
                }
                Err(e) => {
                    tracing::error!(step = %name, error = %e, "Step failed");
                    ctx.signals_mut().record_error(e);
                    break;
                }
            }
        }
        ctx.signals_mut().observe_cancellation();

        let cleanup_start = Instant::now();
        for step in plan.steps[..ran].iter().rev() {
            tracing::debug!(step = step.name(), "Cleaning up step");
            if let Err(e) = step.cleanup(ctx).await {
                tracing::warn!(step = step.name(), error = %e, "Step cleanup failed");
            }
        }

        PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            steps: step_metrics,
            cleanup_duration_ms: cleanup_start.elapsed().as_millis(),
        }
    }
}
