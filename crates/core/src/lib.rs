//! # MoonAgent Core
//!
//! Domain types, collaborator traits, and error definitions for the MoonAgent
//! execution engine. This crate has **no engine logic**; it defines the
//! vocabulary that the agent loop and every collaborator implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat model, tool, checkpoint store) is a trait
//! here. Implementations live in their own crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentState};
pub use checkpoint::CheckpointStore;
pub use error::{CheckpointError, ModelError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use model::{ChatModel, ChunkReceiver, StreamChunk, collect_stream};
pub use tool::{Tool, ToolInfo, ToolRegistry};
