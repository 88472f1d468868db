//! Agent configuration and lifecycle state types.

use serde::{Deserialize, Serialize};

/// Configuration for an agent's identity and budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name used in logs and debug output
    #[serde(default = "default_name")]
    pub name: String,

    /// System prompt sent ahead of every reasoning call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prompt used to nudge the model toward its next step
    #[serde(default = "default_next_step_prompt")]
    pub next_step_prompt: String,

    /// Maximum steps per run (the loop budget)
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Maximum think/act/observe cycles per run
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    /// Enable debug introspection and verbose step logging
    #[serde(default)]
    pub debug: bool,

    /// Capacity of the streaming output channel
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_name() -> String {
    "manus".into()
}
fn default_system_prompt() -> String {
    "You are Manus, a versatile agent that solves tasks step by step, \
     using the available tools when they help."
        .into()
}
fn default_next_step_prompt() -> String {
    "Based on the progress so far, decide the next action. \
     Name a tool if one is needed, otherwise answer directly."
        .into()
}
fn default_max_steps() -> u32 {
    10
}
fn default_max_loops() -> u32 {
    5
}
fn default_stream_buffer() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            system_prompt: default_system_prompt(),
            next_step_prompt: default_next_step_prompt(),
            max_steps: default_max_steps(),
            max_loops: default_max_loops(),
            debug: false,
            stream_buffer: default_stream_buffer(),
        }
    }
}

/// Lifecycle state of an agent.
///
/// `Idle → Running → {Success | Error}`; only `Idle` may start a run and
/// the terminal states persist until `reset()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl AgentState {
    /// Whether the state is `Success` or `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Success | AgentState::Error)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Success => "success",
            AgentState::Error => "error",
        };
        f.write_str(s)
    }
}
