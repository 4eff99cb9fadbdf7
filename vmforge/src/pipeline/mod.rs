//! Sequential step pipeline with reverse-order cleanup.
//!
//! ## Architecture
//!
//! ```text
//! ExecutionPlan → PipelineExecutor → Steps
//!
//! - ExecutionPlan: ordered list of steps, built once per build
//! - PipelineExecutor: runs steps one at a time, stops on halt/error/cancel,
//!   then cleans up every step that ran in reverse order
//! - Step: run + cleanup against a shared mutable context
//! ```
//!
//! Steps communicate only through the context. The executor checks the
//! context's [`Signals`] between steps; nothing preempts a running step.
//!
//! ## Example
//!
//! ```ignore
//! use pipeline::{ExecutionPlan, PipelineExecutor};
//!
//! let plan = ExecutionPlan::new(vec![Box::new(StepA), Box::new(StepB)]);
//! let metrics = PipelineExecutor::execute(plan, &mut ctx).await;
//! match ctx.signals_mut().take_terminal() { ... }
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod signals;
mod step;

pub use metrics::{PipelineMetrics, StepMetrics};
pub use pipeline::{ExecutionPlan, PipelineExecutor};
pub use signals::{Signals, StepContext, Terminal};
pub use step::{BoxedStep, PipelineStep, StepAction};
