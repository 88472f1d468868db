//! HTTP GET tool: fetches a URL and returns the status line and body.
//!
//! Bodies are truncated so a large page cannot flood the conversation.

use std::time::Duration;

use async_trait::async_trait;
use moonagent_core::error::ToolError;
use moonagent_core::tool::Tool;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_MAX_BYTES: usize = 4096;

pub struct HttpGetTool {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpGetTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HttpGetArgs {
    url: String,
}

fn parse_args(arguments: &str) -> Result<HttpGetArgs, ToolError> {
    let args: HttpGetArgs = serde_json::from_str(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("Expected {{\"url\": ...}}: {e}")))?;
    if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
        return Err(ToolError::InvalidArguments(
            "URL must start with http:// or https://".into(),
        ));
    }
    Ok(args)
}

/// Cut `body` to at most `max_bytes`, on a char boundary.
fn truncate_body(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated {} bytes]", &body[..end], body.len() - end)
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API endpoint with an HTTP GET request and return its status and body."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let args = parse_args(arguments)?;
        debug!(url = %args.url, "Fetching URL");

        let response = self
            .client
            .get(&args.url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "http_get".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "http_get".into(),
            reason: format!("Failed to read body: {e}"),
        })?;

        Ok(format!("HTTP {}\n\n{}", status, truncate_body(&body, self.max_bytes)))
    }
}
