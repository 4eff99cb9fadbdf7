//! Step trait for pipeline execution.

use async_trait::async_trait;
use vmforge_shared::errors::VmforgeResult;

/// What the executor should do after a step's `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Halt,
}

/// A unit of build behavior.
///
/// `run` may mutate the context and the outside world. Returning
/// `Err(Cancelled)` marks the build cancelled; any other error is recorded
/// as the build's error. Both stop the pipeline.
///
/// `cleanup` is called for every step whose `run` was entered, in reverse
/// order, whatever the outcome. It inspects the context's signals to decide
/// how much to undo. Its errors are logged, never escalated.
#[async_trait]
pub trait PipelineStep<Ctx: Send>: Send + Sync {
    async fn run(&self, ctx: &mut Ctx) -> VmforgeResult<StepAction>;

    async fn cleanup(&self, _ctx: &mut Ctx) -> VmforgeResult<()> {
        Ok(())
    }

    /// Stable step name for logging and metrics.
    fn name(&self) -> &str;
}

pub type BoxedStep<Ctx> = Box<dyn PipelineStep<Ctx>>;
