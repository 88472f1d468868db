//! CheckpointStore trait: durable storage for suspended runs.
//!
//! The engine serializes run-local state to bytes and hands it to a store
//! keyed by checkpoint id. Stores never interpret the bytes and have no
//! expiry semantics.

use async_trait::async_trait;

use crate::error::CheckpointError;

/// Key/value persistence for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// A short name for this backend (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load the bytes stored under `id`, if any.
    async fn get(&self, id: &str) -> std::result::Result<Option<Vec<u8>>, CheckpointError>;

    /// Store `state` under `id`, replacing any previous value.
    async fn set(&self, id: &str, state: Vec<u8>) -> std::result::Result<(), CheckpointError>;
}
