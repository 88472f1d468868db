//! Execution context: the per-run carrier of inputs, metadata, memory and
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use moonagent_core::{Message, Role};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::memory_state::MemoryState;

/// Input key under which the run's user prompt is stored.
pub const USER_PROMPT_KEY: &str = "user_prompt";

/// A typed input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::Text(s.to_string())
    }
}

impl From<String> for InputValue {
    fn from(s: String) -> Self {
        InputValue::Text(s)
    }
}

impl From<f64> for InputValue {
    fn from(n: f64) -> Self {
        InputValue::Number(n)
    }
}

impl From<i64> for InputValue {
    fn from(n: i64) -> Self {
        InputValue::Number(n as f64)
    }
}

impl From<bool> for InputValue {
    fn from(b: bool) -> Self {
        InputValue::Flag(b)
    }
}

impl From<serde_json::Value> for InputValue {
    fn from(v: serde_json::Value) -> Self {
        InputValue::Json(v)
    }
}

#[derive(Debug, Default, Clone)]
struct ContextState {
    inputs: HashMap<String, InputValue>,
    metadata: HashMap<String, String>,
}

/// Shared, mutable context for one run.
///
/// Inputs and metadata sit behind one lock; memory has its own. Cloning the
/// memory handle is cheap, so branches see the same conversation.
#[derive(Debug)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    state: RwLock<ContextState>,
    checkpoint_id: Option<String>,
    memory: Arc<MemoryState>,
}

impl ExecutionContext {
    /// A fresh context with default memory capacity and its own token.
    pub fn new() -> Self {
        Self::with_memory(CancellationToken::new(), Arc::new(MemoryState::default()))
    }

    /// A context bound to `cancel` and sharing `memory`.
    pub fn with_memory(cancel: CancellationToken, memory: Arc<MemoryState>) -> Self {
        Self {
            cancel,
            state: RwLock::new(ContextState::default()),
            checkpoint_id: None,
            memory,
        }
    }

    /// Tag this context with a checkpoint id, used to store or resume a
    /// suspended run.
    pub fn with_checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }

    /// Derive a child context: inputs and metadata are copied, memory is
    /// shared, cancellation comes from `cancel`.
    pub fn branch(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            state: RwLock::new(self.state.read().clone()),
            checkpoint_id: self.checkpoint_id.clone(),
            memory: Arc::clone(&self.memory),
        }
    }

    // ── Cancellation ─────────────────────────────────────────────────────

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn checkpoint_id(&self) -> Option<&str> {
        self.checkpoint_id.as_deref()
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    /// Store an input; a later write to the same key wins.
    pub fn set_input(&self, key: impl Into<String>, value: impl Into<InputValue>) {
        self.state.write().inputs.insert(key.into(), value.into());
    }

    pub fn input(&self, key: &str) -> Option<InputValue> {
        self.state.read().inputs.get(key).cloned()
    }

    pub fn input_text(&self, key: &str) -> Option<String> {
        match self.state.read().inputs.get(key) {
            Some(InputValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn input_number(&self, key: &str) -> Option<f64> {
        match self.state.read().inputs.get(key) {
            Some(InputValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn input_flag(&self, key: &str) -> Option<bool> {
        match self.state.read().inputs.get(key) {
            Some(InputValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn user_prompt(&self) -> Option<String> {
        self.input_text(USER_PROMPT_KEY)
    }

    pub fn set_user_prompt(&self, prompt: impl Into<String>) {
        self.set_input(USER_PROMPT_KEY, InputValue::Text(prompt.into()));
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.write().metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.state.read().metadata.get(key).cloned()
    }

    // ── Memory ───────────────────────────────────────────────────────────

    pub fn memory(&self) -> &Arc<MemoryState> {
        &self.memory
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.memory.add(Role::User, content);
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.memory.add(Role::Assistant, content);
    }

    pub fn add_system_message(&self, content: impl Into<String>) {
        self.memory.add(Role::System, content);
    }

    /// Copies of the last `n` messages.
    pub fn conversation_history(&self, n: usize) -> Vec<Message> {
        self.memory.recent(n)
    }

    pub fn clear_memory(&self) {
        self.memory.clear();
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
