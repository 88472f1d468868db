//! Built-in tool implementations for MoonAgent.
//!
//! Tools give the agent the ability to interact with the world:
//! tell the time and fetch pages over HTTP.

pub mod clock;
pub mod http_get;

pub use clock::ClockTool;
pub use http_get::HttpGetTool;

use moonagent_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;

/// All built-in tools, in registration order.
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(ClockTool), Arc::new(HttpGetTool::new())]
}

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in default_tools() {
        // Built-in names are distinct
        let _ = registry.register(tool);
    }
    registry
}
