//! ChatModel trait: the abstraction over language model backends.
//!
//! A ChatModel knows how to turn a conversation into the next assistant
//! message, either in one piece or as a stream of content deltas.
//!
//! Implementations: OpenAI-compatible HTTP endpoints, scripted test models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::message::{Message, ToolCall};
use crate::tool::ToolInfo;

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls carried by the final chunk (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// The receiving end of a model stream.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ModelError>>;

/// The core ChatModel trait.
///
/// The agent engine calls `generate()` or `stream()` without knowing which
/// backend is answering.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// A human-readable name for this model backend.
    fn name(&self) -> &str;

    /// Send the conversation and get the complete assistant message.
    async fn generate(&self, messages: Vec<Message>) -> std::result::Result<Message, ModelError>;

    /// Send the conversation and get a stream of response chunks.
    ///
    /// Default implementation calls `generate()` and wraps the result as a single chunk.
    async fn stream(&self, messages: Vec<Message>) -> std::result::Result<ChunkReceiver, ModelError> {
        let message = self.generate(messages).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(message.content),
                tool_calls: message.tool_calls,
                done: true,
            }))
            .await;
        Ok(rx)
    }

    /// Advertise the tool catalog to the backend.
    ///
    /// Backends without native tool calling can ignore this.
    fn bind_tools(&self, _tools: &[ToolInfo]) -> std::result::Result<(), ModelError> {
        Ok(())
    }
}

/// Drain a chunk stream into one assistant message.
pub async fn collect_stream(mut rx: ChunkReceiver) -> std::result::Result<Message, ModelError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.content {
            content.push_str(&delta);
        }
        tool_calls.extend(chunk.tool_calls);
        if chunk.done {
            break;
        }
    }
    Ok(Message::assistant(content).with_tool_calls(tool_calls))
}
