//! In-memory checkpoint store: useful for tests and single-process sessions.

use async_trait::async_trait;
use moonagent_core::CheckpointStore;
use moonagent_core::error::CheckpointError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A checkpoint store that keeps serialized state in a HashMap.
/// Checkpoints are lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, state: Vec<u8>) -> Result<(), CheckpointError> {
        if id.is_empty() {
            return Err(CheckpointError::InvalidId(id.to_string()));
        }
        self.entries.write().await.insert(id.to_string(), state);
        Ok(())
    }
}
