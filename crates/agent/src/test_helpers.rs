//! Shared test helpers for engine tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use moonagent_core::error::ToolError;
use moonagent_core::{ChatModel, Message, Tool};
use moonagent_providers::ScriptedModel;
use parking_lot::Mutex;

use crate::base::{AgentProfile, StepFunction, StepScope};
use crate::checkpoint::PendingAction;
use crate::error::AgentError;

/// What a [`ScriptedStep`] does on its next call.
#[derive(Debug, Clone)]
pub enum StepReply {
    Text(String),
    Nothing,
    Fail(String),
    Suspend(PendingAction),
    /// Never completes
    Hang,
}

impl StepReply {
    pub fn text(s: &str) -> Self {
        StepReply::Text(s.to_string())
    }

    pub fn fail(s: &str) -> Self {
        StepReply::Fail(s.to_string())
    }
}

/// A step function that replays scripted replies.
///
/// Stops the loop on a step whose content is `DONE`. Runs out of script as
/// an error.
#[derive(Default)]
pub struct ScriptedStep {
    script: Mutex<VecDeque<StepReply>>,
    calls: AtomicUsize,
    resets: AtomicUsize,
    restored: Mutex<Option<PendingAction>>,
}

impl ScriptedStep {
    pub fn new(replies: Vec<StepReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// The pending action handed over by the last restore.
    pub fn restored_pending(&self) -> Option<PendingAction> {
        self.restored.lock().clone()
    }
}

#[async_trait::async_trait]
impl StepFunction for ScriptedStep {
    async fn step(&self, _scope: StepScope<'_>) -> Result<Option<Message>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.lock().pop_front();
        match reply {
            Some(StepReply::Text(text)) => Ok(Some(Message::assistant(text))),
            Some(StepReply::Nothing) => Ok(None),
            Some(StepReply::Fail(reason)) => Err(AgentError::Step(reason)),
            Some(StepReply::Suspend(pending)) => Err(AgentError::Suspended(Box::new(pending))),
            Some(StepReply::Hang) => std::future::pending().await,
            None => Err(AgentError::Step("script exhausted".into())),
        }
    }

    fn should_stop(&self, message: &Message) -> bool {
        message.content == "DONE"
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn restore(
        &self,
        _state: serde_json::Value,
        pending: Option<PendingAction>,
    ) -> Result<(), AgentError> {
        *self.restored.lock() = pending;
        Ok(())
    }
}

/// A profile backed by a model that is never expected to be called.
pub fn scripted_profile(name: &str) -> AgentProfile {
    AgentProfile::new(name, Arc::new(ScriptedModel::repeating("unused")))
}

/// A profile named `tester` backed by `model`.
pub fn profile_with(model: Arc<dyn ChatModel>) -> AgentProfile {
    AgentProfile::new("tester", model)
}

/// A tool that records its arguments and answers with a fixed output.
pub struct RecordingTool {
    name: String,
    output: Result<String, String>,
    calls: Mutex<Vec<String>>,
}

impl RecordingTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Ok(output.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Err(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Arguments of every invocation, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        self.calls.lock().push(arguments.to_string());
        self.output.clone().map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        })
    }
}
