//! Scripted chat model: replays canned responses in order.
//!
//! Used for offline runs of the CLI (`--offline`) and for deterministic tests
//! of the agent engine.

use std::collections::VecDeque;

use async_trait::async_trait;
use moonagent_core::error::ModelError;
use moonagent_core::message::Message;
use moonagent_core::model::ChatModel;
use moonagent_core::tool::ToolInfo;
use parking_lot::Mutex;

/// A chat model that returns scripted responses in sequence.
///
/// When the script runs out, the fallback response (if any) is returned for
/// every further call; without a fallback the call fails.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
    bound_tools: Mutex<Vec<ToolInfo>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// A model that answers every call with the same text.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self::default().with_fallback(text)
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Append a failure to the script.
    pub fn then_fail(self, error: ModelError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Number of `generate` calls served so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// The conversation passed to the most recent call.
    pub fn last_request(&self) -> Option<Vec<Message>> {
        self.requests.lock().last().cloned()
    }

    /// Tool names most recently bound.
    pub fn bound_tool_names(&self) -> Vec<String> {
        self.bound_tools.lock().iter().map(|t| t.name.clone()).collect()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<Message, ModelError> {
        self.requests.lock().push(messages);
        match self.script.lock().pop_front() {
            Some(Ok(text)) => Ok(Message::assistant(text)),
            Some(Err(e)) => Err(e),
            None => self
                .fallback
                .clone()
                .map(Message::assistant)
                .ok_or_else(|| ModelError::InvalidResponse("scripted model exhausted".into())),
        }
    }

    fn bind_tools(&self, tools: &[ToolInfo]) -> Result<(), ModelError> {
        *self.bound_tools.lock() = tools.to_vec();
        Ok(())
    }
}
