//! Array store interface and the backends a container can bind to.
//!
//! Array I/O goes through `zarrs`: each store hands out its type-erased `zarrs` storage,
//! and [`ArrayStoreExt`] builds groups, chunked arrays and attributes on it. [`Backend`]
//! is the closed set of physical forms a container can live in, each with its own
//! finalize action.

mod archive;
mod directory;
mod hierarchy;
mod memory;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zarrs::storage::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableListableStorage, StoreKey,
    StorePrefix, WritableStorageTraits,
};

pub use archive::ZipStore;
pub use directory::{DirectoryStore, TemporaryStore};
pub use hierarchy::{ArrayMeta, ArrayReader, ArrayStoreExt, NodeKind, ZarrArray, join_key, node_path};
pub use memory::MemoryStore;

use crate::error::{Result, TrxError};

/// A `zarrs` storage plus the write policy of the physical form behind it.
pub trait Store {
    fn storage(&self) -> &ReadableWritableListableStorage;

    fn is_writable(&self) -> bool {
        true
    }

    /// Only archives ever refuse writes.
    fn ensure_writable(&self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(TrxError::ImmutableBackend {
                kind: BackendKind::Archive,
            })
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.storage().get(&StoreKey::new(key)?)?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.storage()
            .set(&StoreKey::new(key)?, value.to_vec().into())?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove `prefix` and every key below `prefix/`. An empty prefix clears the store.
    fn remove_prefix(&mut self, prefix: &str) -> Result<()> {
        self.ensure_writable()?;
        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            StorePrefix::root()
        } else {
            StorePrefix::new(format!("{prefix}/"))?
        };
        self.storage().erase_prefix(&prefix)?;
        Ok(())
    }

    /// Every key, sorted.
    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .storage()
            .list()?
            .iter()
            .map(|key| key.as_str().to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Keys strictly below `prefix/`, sorted.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key != prefix && prefix_matches(prefix, key))
            .collect())
    }
}

/// True when `key` is `prefix` itself or lies below it.
pub(crate) fn prefix_matches(prefix: &str, key: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    key == prefix
        || (key.len() > prefix.len()
            && key.starts_with(prefix)
            && key.as_bytes()[prefix.len()] == b'/')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// In-process map; contents discarded on close.
    Memory,
    /// Directory under the system temp dir; removed on close.
    Temporary,
    /// Zip archive; sealed on close and never grown.
    Archive,
    /// Directory owned by the caller; left untouched on close.
    Directory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Memory => "memory",
            Self::Temporary => "temporary",
            Self::Archive => "archive",
            Self::Directory => "directory",
        };
        f.write_str(label)
    }
}

/// The physical form a container is bound to.
#[derive(Debug)]
pub enum Backend {
    Memory(MemoryStore),
    Temporary(TemporaryStore),
    Archive(ZipStore),
    Directory(DirectoryStore),
}

impl Backend {
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub fn temporary() -> Result<Self> {
        Ok(Self::Temporary(TemporaryStore::new()?))
    }

    /// User-owned directory, created when missing.
    pub fn directory<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::Directory(DirectoryStore::create(path)?))
    }

    pub fn open_directory<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::Directory(DirectoryStore::open(path)?))
    }

    pub fn open_archive<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::Archive(ZipStore::open(path)?))
    }

    pub fn create_archive<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::Archive(ZipStore::create(path)?))
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::Temporary(_) => BackendKind::Temporary,
            Self::Archive(_) => BackendKind::Archive,
            Self::Directory(_) => BackendKind::Directory,
        }
    }

    /// Whether arrays may grow in place.
    #[must_use]
    pub fn is_growable(&self) -> bool {
        !matches!(self, Self::Archive(_))
    }

    /// Filesystem location, for on-disk backends.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::Temporary(temp) => Some(temp.path()),
            Self::Archive(archive) => Some(archive.path()),
            Self::Directory(dir) => Some(dir.root()),
        }
    }

    fn inner(&self) -> &dyn Store {
        match self {
            Self::Memory(store) => store,
            Self::Temporary(temp) => temp.store(),
            Self::Archive(store) => store,
            Self::Directory(store) => store,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Store {
        match self {
            Self::Memory(store) => store,
            Self::Temporary(temp) => temp.store_mut(),
            Self::Archive(store) => store,
            Self::Directory(store) => store,
        }
    }

    /// Run the kind-specific release action. Safe to call more than once.
    pub fn finalize(&mut self) -> Result<()> {
        let kind = self.kind();
        match self {
            Self::Memory(store) => store.clear()?,
            Self::Temporary(temp) => temp.remove()?,
            Self::Archive(archive) => archive.seal()?,
            Self::Directory(dir) => {
                log::debug!(
                    "leaving user-owned directory {} in place",
                    dir.root().display()
                );
            }
        }
        tracing::debug!(target: "trx::store", backend = %kind, "backend finalized");
        Ok(())
    }

    /// blake3 digest over every (key, value) pair in key order. Two backends holding the
    /// same logical tree have the same digest whatever their physical form.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        for key in self.keys()? {
            let value = self.get(&key)?.unwrap_or_default();
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(&value);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl Store for Backend {
    fn storage(&self) -> &ReadableWritableListableStorage {
        self.inner().storage()
    }

    fn is_writable(&self) -> bool {
        self.inner().is_writable()
    }

    fn remove_prefix(&mut self, prefix: &str) -> Result<()> {
        self.inner_mut().remove_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching() {
        assert!(prefix_matches("", "anything"));
        assert!(prefix_matches("groups", "groups"));
        assert!(prefix_matches("groups/", "groups/a/zarr.json"));
        assert!(!prefix_matches("groups", "groupsx/zarr.json"));
        assert!(!prefix_matches("groups/a", "groups"));
    }

    #[test]
    fn digest_ignores_physical_form() {
        let mut memory = Backend::memory();
        let mut temp = Backend::temporary().expect("temp");
        for backend in [&mut memory, &mut temp] {
            backend.set("zarr.json", b"{}").unwrap();
            backend.set("offsets/c/0", &[0, 1, 2]).unwrap();
        }
        assert_eq!(memory.digest().unwrap(), temp.digest().unwrap());
        temp.set("offsets/c/1", &[3]).unwrap();
        assert_ne!(memory.digest().unwrap(), temp.digest().unwrap());
        temp.finalize().unwrap();
    }

    #[test]
    fn finalize_is_kind_specific_and_repeatable() {
        let mut memory = Backend::memory();
        memory.set("k", b"v").unwrap();
        memory.finalize().unwrap();
        assert!(memory.keys().unwrap().is_empty());
        memory.finalize().unwrap();

        let dir = tempfile::tempdir().expect("tmp");
        let mut owned = Backend::directory(dir.path().join("owned")).unwrap();
        owned.set("k", b"v").unwrap();
        owned.finalize().unwrap();
        assert!(dir.path().join("owned").join("k").is_file());
        assert!(owned.is_growable());
        assert_eq!(owned.kind(), BackendKind::Directory);
    }
}
