//! File-based checkpoint store: one JSON document per checkpoint.
//!
//! Each checkpoint is written to `<directory>/<id>.json`. Writes go to a
//! temporary file first and are renamed into place, so a crash never leaves
//! a half-written checkpoint behind.
//!
//! Default location: `~/.moonagent/checkpoints/`

use async_trait::async_trait;
use moonagent_core::CheckpointStore;
use moonagent_core::error::CheckpointError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directory-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `directory`. The directory is created lazily
    /// on the first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Map a checkpoint id to its file, rejecting ids that could escape the
    /// store directory.
    fn path_for(&self, id: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !id.starts_with('.');
        if !valid {
            return Err(CheckpointError::InvalidId(id.to_string()));
        }
        Ok(self.directory.join(format!("{id}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Storage(format!(
                "Failed to read checkpoint {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, id: &str, state: Vec<u8>) -> Result<(), CheckpointError> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            CheckpointError::Storage(format!("Failed to create checkpoint directory: {e}"))
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &state)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to write checkpoint: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to commit checkpoint: {e}")))?;

        debug!(checkpoint_id = id, bytes = state.len(), path = %path.display(), "Checkpoint written");
        Ok(())
    }
}
