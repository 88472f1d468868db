//! OpenAI-compatible chat model.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions` in the OpenAI wire format.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool advertisement via `bind_tools`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use moonagent_config::ModelConfig;
use moonagent_core::error::ModelError;
use moonagent_core::message::{Message, Role, ToolCall};
use moonagent_core::model::{ChatModel, ChunkReceiver, StreamChunk};
use moonagent_core::tool::ToolInfo;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A chat model reached over an OpenAI-compatible HTTP API.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    tools: RwLock<Vec<ToolInfo>>,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a model client for `base_url` (without `/chat/completions`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;
        let model = model.into();

        Ok(Self {
            name: format!("openai-compat:{model}"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            temperature: 0.7,
            max_tokens: 2048,
            tools: RwLock::new(Vec::new()),
            client,
        })
    }

    /// Build from the `[model]` config section.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ModelError::NotConfigured(
                "no API key; set MOONAGENT_API_KEY or OPENAI_API_KEY".into(),
            )
        })?;
        Ok(Self::new(&config.base_url, api_key, &config.model)?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: tc.kind.clone(),
                                function: ApiFunction {
                                    name: tc.function.name.clone(),
                                    arguments: tc.function.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool descriptors to OpenAI API format.
    fn to_api_tools(tools: &[ToolInfo]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        });
        let tools = self.tools.read();
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&tools));
        }
        body
    }

    async fn send(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model backend returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<Message, ModelError> {
        let body = self.request_body(&messages, false);
        debug!(model = %self.model, messages = messages.len(), "Sending completion request");

        let response = self.send(&body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::function(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        Ok(Message::new(Role::Assistant, choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls)
            .with_metadata("model", serde_json::json!(api_response.model)))
    }

    async fn stream(&self, messages: Vec<Message>) -> Result<ChunkReceiver, ModelError> {
        let body = self.request_body(&messages, true);
        debug!(model = %self.model, messages = messages.len(), "Sending streaming request");

        let response = self.send(&body, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let model = self.model.clone();

        // Read the SSE byte stream and forward parsed chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut accumulators: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer.drain(..=line_end);

                    match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => {
                            let _ = tx.send(Ok(final_chunk(&accumulators))).await;
                            return;
                        }
                        SseLine::Invalid(error) => {
                            trace!(model = %model, error = %error, "Ignoring unparseable SSE chunk");
                        }
                        SseLine::Data(stream_resp) => {
                            let Some(choice) = stream_resp.choices.into_iter().next() else {
                                continue;
                            };
                            for delta in choice.delta.tool_calls.unwrap_or_default() {
                                accumulators.entry(delta.index).or_default().absorb(delta);
                            }
                            if choice.delta.content.as_ref().is_some_and(|c| !c.is_empty()) {
                                let chunk = StreamChunk {
                                    content: choice.delta.content,
                                    ..Default::default()
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_chunk(&accumulators))).await;
        });

        Ok(rx)
    }

    fn bind_tools(&self, tools: &[ToolInfo]) -> Result<(), ModelError> {
        *self.tools.write() = tools.to_vec();
        debug!(model = %self.model, count = tools.len(), "Bound tool catalog");
        Ok(())
    }
}

/// One classified line of an SSE body.
enum SseLine {
    Skip,
    Done,
    Data(StreamResponse),
    Invalid(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => SseLine::Data(resp),
        Err(e) => SseLine::Invalid(e.to_string()),
    }
}

fn final_chunk(accumulators: &BTreeMap<u32, ToolCallAccumulator>) -> StreamChunk {
    StreamChunk {
        content: None,
        tool_calls: accumulators.values().map(ToolCallAccumulator::to_tool_call).collect(),
        done: true,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arriving incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn absorb(&mut self, delta: StreamToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = id;
        }
        if let Some(func) = delta.function {
            if let Some(name) = func.name {
                self.name = name;
            }
            if let Some(args) = func.arguments {
                self.arguments.push_str(&args);
            }
        }
    }

    fn to_tool_call(&self) -> ToolCall {
        ToolCall::function(&self.id, &self.name, &self.arguments)
    }
}
