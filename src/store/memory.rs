//! In-process store over the `zarrs` memory storage.

use std::fmt;
use std::sync::Arc;

use zarrs::storage::store::MemoryStore as ZarrMemoryStore;
use zarrs::storage::{ReadableWritableListableStorage, StorePrefix, WritableStorageTraits};

use super::Store;
use crate::error::Result;

/// Ephemeral store; contents live as long as the handle.
pub struct MemoryStore {
    storage: ReadableWritableListableStorage,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            storage: Arc::new(ZarrMemoryStore::new()),
        }
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.storage.erase_prefix(&StorePrefix::root())?;
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.keys()?.is_empty())
    }
}

impl Store for MemoryStore {
    fn storage(&self) -> &ReadableWritableListableStorage {
        &self.storage
    }
}
