//! Checkpoint records for interrupt/resume.
//!
//! A [`RunCheckpoint`] captures everything run-local: loop counters, step
//! history, aggregated results, the memory snapshot, the step function's own
//! state, and the tool call that was about to be dispatched. It is stored as
//! JSON bytes through a [`moonagent_core::CheckpointStore`].

use chrono::{DateTime, Utc};
use moonagent_core::{Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Current on-disk layout version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A tool call held back for human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// The thought that selected the tool
    pub thought: String,

    /// The call that will be dispatched on resume
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// Waiting for the caller to resume
    Suspended,
    /// Already consumed by a resumed run
    Resumed,
}

/// Serialized state of a suspended run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub version: u32,

    /// Name of the agent that wrote the checkpoint
    pub agent: String,

    pub status: CheckpointStatus,

    /// The step that was in progress when the run suspended
    pub current_step: u32,

    pub step_history: Vec<String>,

    /// Aggregated `Step N result: ...` lines so far
    pub results: Vec<String>,

    pub user_prompt: String,

    /// Memory snapshot, oldest first
    pub memory: Vec<Message>,

    /// Step function state (e.g. ReAct cycles)
    #[serde(default)]
    pub stepper: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAction>,

    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Whether a run may resume from this checkpoint.
    pub fn is_resumable(&self) -> bool {
        self.status == CheckpointStatus::Suspended
    }
}

/// Returned to the caller when a run suspends.
#[derive(Debug, Clone)]
pub struct Interrupt {
    /// Id to put on the context when resuming
    pub checkpoint_id: String,

    /// The tool call awaiting confirmation
    pub pending: PendingAction,

    /// The serialized checkpoint as written to the store
    pub state: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunCheckpoint {
        RunCheckpoint {
            version: CHECKPOINT_VERSION,
            agent: "manus".into(),
            status: CheckpointStatus::Suspended,
            current_step: 2,
            step_history: vec!["first".into()],
            results: vec!["Step 1 result: first".into()],
            user_prompt: "find rust news".into(),
            memory: vec![Message::user("find rust news")],
            stepper: serde_json::json!({"current_loop": 1}),
            pending: Some(PendingAction {
                thought: "search the web".into(),
                tool_call: ToolCall::function("call_search_1", "search", r#"{"query":"rust"}"#),
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bytes_roundtrip_preserves_pending_call() {
        let cp = sample();
        let restored = RunCheckpoint::from_bytes(&cp.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.current_step, 2);
        assert_eq!(restored.pending, cp.pending);
        assert_eq!(restored.memory.len(), 1);
        assert!(restored.is_resumable());
    }

    #[test]
    fn resumed_checkpoint_is_not_resumable() {
        let mut cp = sample();
        cp.status = CheckpointStatus::Resumed;
        assert!(!cp.is_resumable());
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["status"], "resumed");
    }
}
