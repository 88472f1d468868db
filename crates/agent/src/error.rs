//! Agent engine errors.

use moonagent_core::AgentState;
use moonagent_core::error::{CheckpointError, ModelError, ToolError};
use thiserror::Error;

use crate::checkpoint::{Interrupt, PendingAction};

/// Everything a run can fail with.
///
/// `Suspended` never escapes a run: the step loop converts it into a stored
/// checkpoint and returns `Interrupted` to the caller.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent '{agent}' cannot start a run while {state}")]
    Busy { agent: String, state: AgentState },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Stream receiver dropped")]
    StreamClosed,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Checkpoint encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("No pending action for checkpoint {0}")]
    NoPendingAction(String),

    #[error("Run suspended before tool call '{}'", .0.tool_call.function.name)]
    Suspended(Box<PendingAction>),

    #[error("Run interrupted before tool call '{}' (checkpoint {})", .0.pending.tool_call.function.name, .0.checkpoint_id)]
    Interrupted(Box<Interrupt>),
}

impl AgentError {
    /// The interrupt payload, if this error is a suspension handed back to
    /// the caller.
    pub fn as_interrupt(&self) -> Option<&Interrupt> {
        match self {
            AgentError::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }
}
