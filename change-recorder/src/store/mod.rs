//! Durable storage for recorder state
//!
//! The recorder only needs two operations from its backing store: load the
//! last saved blob (if any) and replace it. Anything that can do that
//! durably qualifies; three backends are provided.

pub mod file;
pub mod snapshot;
pub mod sqlite;

use std::sync::{Arc, Mutex};

use crate::types::error::{RecorderError, Result};

pub use file::FileStore;
pub use snapshot::QueueSnapshot;
pub use sqlite::SqliteStore;

/// Persistence handle for one recorder's opaque state blob
pub trait DurableStore: Send + Sync {
    /// Last saved blob, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the saved blob. Must be durable when it returns `Ok`.
    fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Process-local store; clones share the same blob.
///
/// Survives recorder reconstruction within one process, not a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored blob directly, bypassing the recorder
    pub fn replace(&self, bytes: Option<Vec<u8>>) -> Result<()> {
        let mut guard = self
            .blob
            .lock()
            .map_err(|e| RecorderError::Persistence(format!("Failed to lock memory store: {}", e)))?;
        *guard = bytes;
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        let guard = self
            .blob
            .lock()
            .map_err(|e| RecorderError::Persistence(format!("Failed to lock memory store: {}", e)))?;
        Ok(guard.clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        self.replace(Some(bytes.to_vec()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
