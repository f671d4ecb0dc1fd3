//! Zip archive store: the finalized, write-once physical form.
//!
//! Opening an archive unpacks its entries into `zarrs` memory storage that is never
//! written again. A new archive collects keys in memory and writes them, uncompressed,
//! when sealed.

use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zarrs::storage::store::MemoryStore as ZarrMemoryStore;
use zarrs::storage::{ReadableWritableListableStorage, StoreKey, WritableStorageTraits};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::Store;
use crate::error::Result;

enum ArchiveMode {
    Reading,
    Writing(ZipWriter<File>),
    Sealed,
}

pub struct ZipStore {
    path: PathBuf,
    mode: ArchiveMode,
    storage: ReadableWritableListableStorage,
}

impl fmt::Debug for ZipStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            ArchiveMode::Reading => "reading",
            ArchiveMode::Writing(_) => "writing",
            ArchiveMode::Sealed => "sealed",
        };
        f.debug_struct("ZipStore")
            .field("path", &self.path)
            .field("mode", &mode)
            .finish_non_exhaustive()
    }
}

impl ZipStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let storage = ZarrMemoryStore::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let key = StoreKey::new(entry.name())?;
            let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry.read_to_end(&mut buf)?;
            storage.set(&key, buf.into())?;
        }
        log::debug!("opened archive {} ({} entries)", path.display(), archive.len());
        Ok(Self {
            path,
            mode: ArchiveMode::Reading,
            storage: Arc::new(storage),
        })
    }

    /// Start a new archive at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = ZipWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            mode: ArchiveMode::Writing(writer),
            storage: Arc::new(ZarrMemoryStore::new()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self.mode, ArchiveMode::Sealed)
    }

    /// Write every collected key and the central directory, then refuse further writes.
    /// Reading archives just release their entries.
    pub fn seal(&mut self) -> Result<()> {
        if let ArchiveMode::Writing(mut writer) =
            std::mem::replace(&mut self.mode, ArchiveMode::Sealed)
        {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            let keys = self.keys()?;
            for key in &keys {
                let value = self.get(key)?.unwrap_or_default();
                writer.start_file(key.as_str(), options)?;
                writer.write_all(&value)?;
            }
            writer.finish()?;
            log::debug!("sealed archive {} ({} entries)", self.path.display(), keys.len());
        }
        self.storage = Arc::new(ZarrMemoryStore::new());
        Ok(())
    }
}

impl Store for ZipStore {
    fn storage(&self) -> &ReadableWritableListableStorage {
        &self.storage
    }

    fn is_writable(&self) -> bool {
        matches!(self.mode, ArchiveMode::Writing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrxError;
    use tempfile::tempdir;

    #[test]
    fn write_seal_then_read_back() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("tiny.trx");
        let mut writer = ZipStore::create(&path).expect("create");
        writer.set("zarr.json", br#"{"zarr_format":3}"#).unwrap();
        writer.set("offsets/c/0", &[1, 2, 3]).unwrap();
        writer.seal().unwrap();
        assert!(writer.is_sealed());
        assert!(writer.set("offsets/c/1", &[9]).is_err());

        let mut reader = ZipStore::open(&path).expect("open");
        assert_eq!(reader.get("offsets/c/0").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(reader.get("offsets/c/1").unwrap(), None);
        assert_eq!(reader.list_prefix("offsets").unwrap(), vec!["offsets/c/0"]);
        assert!(!reader.is_writable());
        assert!(matches!(
            reader.set("x", b""),
            Err(TrxError::ImmutableBackend { .. })
        ));
        assert!(reader.remove_prefix("offsets").is_err());
    }
}
