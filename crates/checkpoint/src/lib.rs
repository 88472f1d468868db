//! Checkpoint store implementations for MoonAgent.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;

use moonagent_config::{CheckpointBackend, CheckpointConfig};
use moonagent_core::CheckpointStore;
use std::sync::Arc;

/// Build the store selected by configuration.
pub fn build_from_config(config: &CheckpointConfig) -> Arc<dyn CheckpointStore> {
    match config.backend {
        CheckpointBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(config.resolved_directory())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_selects_backend() {
        let store = build_from_config(&CheckpointConfig::default());
        assert_eq!(store.name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig {
            backend: CheckpointBackend::File,
            directory: Some(dir.path().to_path_buf()),
            interrupt_before_tools: true,
        };
        assert_eq!(build_from_config(&config).name(), "file");
    }
}
