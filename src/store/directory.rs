//! Directory-tree stores: user-owned locations and self-removing temporary trees.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::ReadableWritableListableStorage;

use super::Store;
use crate::error::{Result, TrxError};

/// One file per key below `root`, through the `zarrs` filesystem storage.
#[derive(Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    storage: ReadableWritableListableStorage,
}

impl fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl DirectoryStore {
    /// Bind to `root`, creating it when missing.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs_err::create_dir_all(root.as_ref())?;
        Self::open(root)
    }

    /// Bind to an existing directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TrxError::InvalidBackendPath {
                path: root,
                reason: "not a directory".into(),
            });
        }
        let storage = FilesystemStore::new(&root).map_err(|err| TrxError::InvalidBackendPath {
            path: root.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            root,
            storage: Arc::new(storage),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove everything below the root, keeping the root itself.
    pub fn clear(&mut self) -> Result<()> {
        for entry in fs_err::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs_err::remove_dir_all(entry.path())?;
            } else {
                fs_err::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

impl Store for DirectoryStore {
    fn storage(&self) -> &ReadableWritableListableStorage {
        &self.storage
    }

    fn remove_prefix(&mut self, prefix: &str) -> Result<()> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self.clear();
        }
        let mut path = self.root.clone();
        path.extend(prefix.split('/'));
        if path.is_dir() {
            fs_err::remove_dir_all(&path)?;
        } else if path.is_file() {
            fs_err::remove_file(&path)?;
        }
        log::debug!("removed {}", path.display());
        Ok(())
    }
}

/// Directory store under the system temp dir, removed on finalize.
#[derive(Debug)]
pub struct TemporaryStore {
    store: DirectoryStore,
    dir: Option<TempDir>,
}

impl TemporaryStore {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("trx_").tempdir()?;
        let store = DirectoryStore::open(dir.path())?;
        log::debug!("temporary store at {}", dir.path().display());
        Ok(Self {
            store,
            dir: Some(dir),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.root()
    }

    pub(crate) fn store(&self) -> &DirectoryStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut DirectoryStore {
        &mut self.store
    }

    /// Recursively remove the tree. Later calls do nothing.
    pub fn remove(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            log::debug!("removed temporary store {}", path.display());
        }
        Ok(())
    }
}
