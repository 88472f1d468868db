//! The MoonAgent execution engine.
//!
//! Agents are layered by composition:
//!
//! 1. [`BaseAgent`] runs a bounded step loop over any [`StepFunction`],
//!    owning the lifecycle, step history and interrupt/resume.
//! 2. [`ReActAgent`] plugs in a think → act → observe cycle driven by a
//!    [`ReActStrategy`].
//! 3. [`ToolCallAgent`] uses a strategy that dispatches registered tools.
//! 4. [`Manus`] assembles a tool-calling agent from the application config.
//!
//! Every run carries an [`ExecutionContext`] holding its inputs, bounded
//! conversation memory and cancellation token.

pub mod arguments;
pub mod base;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod manus;
pub mod react;
pub mod strategy;
pub mod tool_call;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use arguments::{ArgumentExtractor, JsonArgumentExtractor};
pub use base::{
    AgentProfile, BUDGET_EXHAUSTED_MARKER, BaseAgent, StepFunction, StepScope, TASK_COMPLETED_MARKER,
};
pub use checkpoint::{CheckpointStatus, Interrupt, PendingAction, RunCheckpoint};
pub use context::{ExecutionContext, InputValue, MemoryState};
pub use error::AgentError;
pub use manus::{DebugInfo, Manus};
pub use react::{LOOP_EXHAUSTED_MESSAGE, ReActAgent, ReActCycle, ReActStep};
pub use strategy::{CustomStrategy, CycleContext, DefaultStrategy, ReActStrategy, ThinkInput};
pub use tool_call::{NO_TOOL_NEEDED, ToolCallAgent, ToolCallStrategy};
