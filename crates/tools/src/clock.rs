//! Clock tool: reports the current date and time.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use moonagent_core::error::ToolError;
use moonagent_core::tool::Tool;

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally shift to a UTC offset in hours."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Offset from UTC in whole hours, between -12 and 14. Defaults to 0."
                }
            }
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let args: serde_json::Value = if arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("Invalid JSON: {e}")))?
        };

        let hours = args["utc_offset_hours"].as_i64().unwrap_or(0);
        if !(-12..=14).contains(&hours) {
            return Err(ToolError::InvalidArguments(format!(
                "utc_offset_hours must be between -12 and 14, got {hours}"
            )));
        }

        let offset = FixedOffset::east_opt((hours * 3600) as i32).ok_or_else(|| {
            ToolError::InvalidArguments(format!("Unsupported offset: {hours}"))
        })?;
        let now = Utc::now().with_timezone(&offset);
        Ok(now.to_rfc3339())
    }
}
