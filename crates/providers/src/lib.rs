//! Chat model implementations for MoonAgent.
//!
//! All models implement the `moonagent_core::ChatModel` trait.
//! [`build_from_config`] picks the right one for the CLI.

pub mod openai_compat;
pub mod scripted;

pub use openai_compat::OpenAiCompatModel;
pub use scripted::ScriptedModel;

use moonagent_config::ModelConfig;
use moonagent_core::ChatModel;
use moonagent_core::error::ModelError;
use std::sync::Arc;

/// Build the chat model described by the `[model]` config section.
///
/// `offline` swaps in a [`ScriptedModel`] that answers every call with a
/// fixed reply, so the engine can be exercised without network access.
pub fn build_from_config(config: &ModelConfig, offline: bool) -> Result<Arc<dyn ChatModel>, ModelError> {
    if offline {
        return Ok(Arc::new(ScriptedModel::repeating(
            "Offline mode: no model backend configured.",
        )));
    }
    Ok(Arc::new(OpenAiCompatModel::from_config(config)?))
}
