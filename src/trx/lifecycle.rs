//! Construction, backend binding, duplication and release of `TrxFile` handles.
//!
//! Responsibilities:
//! - Lay out a blank container (root attributes, `positions`, `offsets`, the four collections).
//! - Clone a template's schema with zero rows, keeping each array's chunk class.
//! - Open existing stores, by backend or by path, and save to a directory or archive.
//! - Bind, rebind and finalize backends exactly once.

use std::path::Path;

use serde_json::Value;
use tracing::instrument;

use super::{TrxFile, group_data_path, group_data_root, group_path, point_path, streamline_path};
use crate::constants::{
    ARCHIVE_EXTENSIONS, ATTR_DIMENSIONS, ATTR_NB_POINTS, ATTR_NB_STREAMLINES,
    ATTR_VOXEL_TO_RASMM, DATA_PER_GROUP, DATA_PER_POINT, DATA_PER_STREAMLINE, GROUPS, OFFSETS,
    POSITIONS,
};
use crate::error::{Result, TrxError};
use crate::store::{ArrayStoreExt, Backend, BackendKind, Store};
use crate::types::{ChunkClass, DType, SpaceAttributes, SpatialReference, TrxOptions};

/// Whether `path` names an archive by extension.
fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Open the container stored at `path`: a directory, or a `.zip`/`.trx` archive.
pub fn load<P: AsRef<Path>>(path: P) -> Result<TrxFile> {
    TrxFile::load(path)
}

impl TrxFile {
    /// Blank container in a temporary directory, with identity space attributes.
    pub fn new() -> Result<Self> {
        Self::create(Backend::temporary()?, TrxOptions::default())
    }

    /// Blank container in `backend`. Anything already in the backend is discarded.
    pub fn create(backend: Backend, options: TrxOptions) -> Result<Self> {
        log::debug!("no reference provided, using blank space attributes");
        Self::from_reference(&SpaceAttributes::default(), backend, options)
    }

    /// Blank container whose affine and dimensions come from `reference`.
    pub fn from_reference<R: SpatialReference + ?Sized>(
        reference: &R,
        backend: Backend,
        options: TrxOptions,
    ) -> Result<Self> {
        let space = reference.space_attributes()?;
        let positions_dtype = options.positions_dtype;
        let mut trx = Self::bind_new(backend, options)?;
        trx.write_blank(&space, positions_dtype)?;
        Ok(trx)
    }

    /// Zero-row copy of `template`'s schema in a temporary directory.
    pub fn init_as(template: &TrxFile) -> Result<Self> {
        Self::init_as_in(template, Backend::temporary()?)
    }

    /// Zero-row copy of `template`'s schema in `backend`: same keys, dtypes and trailing
    /// shapes, chunked by each array's class.
    pub fn init_as_in(template: &TrxFile, backend: Backend) -> Result<Self> {
        let space = template.space_attributes()?;
        let source = template.store()?;
        let positions_dtype = source.array_meta(POSITIONS)?.dtype();
        let mut trx = Self::bind_new(backend, template.options.clone())?;
        trx.write_blank(&space, positions_dtype)?;

        for key in template.data_per_point_keys()? {
            trx.clone_empty(source, &point_path(&key), ChunkClass::Point)?;
        }
        for key in template.data_per_streamline_keys()? {
            trx.clone_empty(source, &streamline_path(&key), ChunkClass::Streamline)?;
        }
        for name in template.group_keys()? {
            trx.clone_empty(source, &group_path(&name), ChunkClass::Group)?;
        }
        for group in template.data_per_group_groups()? {
            let keys = template.data_per_group_keys(&group)?;
            if keys.is_empty() {
                continue;
            }
            trx.store_mut()?.create_group(&group_data_root(&group))?;
            for key in keys {
                trx.clone_empty(source, &group_data_path(&group, &key), ChunkClass::Group)?;
            }
        }
        Ok(trx)
    }

    /// Bind to a backend that already holds a container.
    pub fn open(backend: Backend) -> Result<Self> {
        Self::open_with(backend, TrxOptions::default())
    }

    pub fn open_with(backend: Backend, options: TrxOptions) -> Result<Self> {
        if !backend.contains_group("")? {
            return Err(TrxError::MissingNode {
                path: "/".to_string(),
            });
        }
        for required in [POSITIONS, OFFSETS] {
            if !backend.contains_array(required)? {
                return Err(TrxError::MissingNode {
                    path: required.to_string(),
                });
            }
        }
        let trx = Self {
            backend: Some(backend),
            options,
        };
        tracing::debug!(
            target: "trx::lifecycle",
            backend = %trx.store()?.kind(),
            nb_streamlines = trx.nb_streamlines()?,
            nb_points = trx.nb_points()?,
            "opened container"
        );
        Ok(trx)
    }

    /// Open a directory as a user-owned backend, or a `.zip`/`.trx` file as a read-only
    /// archive.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let backend = if path.is_dir() {
            Backend::open_directory(path)?
        } else if path.is_file() && is_archive_path(path) {
            Backend::open_archive(path)?
        } else {
            return Err(TrxError::InvalidBackendPath {
                path: path.to_path_buf(),
                reason: "expected a directory or an existing .zip/.trx file".into(),
            });
        };
        Self::open(backend)
    }

    /// Write every key to `path`: a sealed archive for `.zip`/`.trx`, a directory tree
    /// for a path without extension. An existing target is replaced.
    #[instrument(target = "trx::save", skip_all, fields(path = %path.as_ref().display()))]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let source = self.store()?;
        if source.location() == Some(path) {
            return Err(TrxError::InvalidBackendPath {
                path: path.to_path_buf(),
                reason: "refusing to overwrite the container's own backend".into(),
            });
        }
        let mut target = if is_archive_path(path) {
            if path.is_file() {
                fs_err::remove_file(path)?;
            }
            Backend::create_archive(path)?
        } else if path.extension().is_none() {
            if path.is_dir() {
                fs_err::remove_dir_all(path)?;
            }
            Backend::directory(path)?
        } else {
            return Err(TrxError::InvalidBackendPath {
                path: path.to_path_buf(),
                reason: "expected a .zip/.trx extension or none".into(),
            });
        };
        source.copy_store(&mut target)?;
        target.finalize()?;
        tracing::info!(target: "trx::save", kind = %target.kind(), "container saved");
        Ok(())
    }

    /// Independent copy in a fresh in-memory backend.
    pub fn deepcopy(&self) -> Result<Self> {
        self.deepcopy_into(Backend::memory())
    }

    /// Copy every persisted byte into `backend`, verify the copy, and reopen it.
    #[instrument(target = "trx::deepcopy", skip_all, fields(kind = %backend.kind()))]
    pub fn deepcopy_into(&self, mut backend: Backend) -> Result<Self> {
        ensure_growable(&backend)?;
        let source = self.store()?;
        backend.remove_prefix("")?;
        source.copy_store(&mut backend)?;
        let (expected, actual) = (source.digest()?, backend.digest()?);
        if expected != actual {
            return Err(TrxError::InvalidLayout {
                path: "/".to_string(),
                reason: format!("copy digest {actual} does not match source {expected}"),
            });
        }
        Self::open_with(backend, self.options.clone())
    }

    /// Bind to `backend`, finalizing the previously bound one.
    pub fn set_backend(&mut self, backend: Backend) -> Result<()> {
        if let Some(mut previous) = self.backend.take() {
            previous.finalize()?;
        }
        self.backend = Some(backend);
        Ok(())
    }

    /// Release the backend: clear memory, remove temporary trees, seal archives, leave
    /// user directories in place. Closing twice is a no-op.
    #[instrument(target = "trx::lifecycle", skip_all)]
    pub fn close(&mut self) -> Result<()> {
        match self.backend.take() {
            Some(mut backend) => {
                let kind = backend.kind();
                backend.finalize()?;
                tracing::debug!(target: "trx::lifecycle", backend = %kind, "container closed");
            }
            None => {
                tracing::debug!(target: "trx::lifecycle", "container already closed");
            }
        }
        Ok(())
    }

    fn bind_new(mut backend: Backend, options: TrxOptions) -> Result<Self> {
        ensure_growable(&backend)?;
        backend.remove_prefix("")?;
        Ok(Self {
            backend: Some(backend),
            options,
        })
    }

    fn write_blank(&mut self, space: &SpaceAttributes, positions_dtype: DType) -> Result<()> {
        let point_rows = self.chunk_rows(ChunkClass::Point);
        let streamline_rows = self.chunk_rows(ChunkClass::Streamline);
        let store = self.store_mut()?;
        store.create_group("")?;
        store.set_attr("", ATTR_VOXEL_TO_RASMM, serde_json::to_value(space.affine)?)?;
        store.set_attr("", ATTR_DIMENSIONS, serde_json::to_value(space.dimensions)?)?;
        store.set_attr("", ATTR_NB_STREAMLINES, Value::from(0u64))?;
        store.set_attr("", ATTR_NB_POINTS, Value::from(0u64))?;
        store.create_array(POSITIONS, positions_dtype, &[3], point_rows)?;
        store.create_array(OFFSETS, DType::UInt64, &[], streamline_rows)?;
        for collection in [DATA_PER_POINT, DATA_PER_STREAMLINE, DATA_PER_GROUP, GROUPS] {
            store.create_group(collection)?;
        }
        Ok(())
    }

    fn clone_empty(&mut self, source: &Backend, path: &str, class: ChunkClass) -> Result<()> {
        let meta = source.array_meta(path)?;
        let dtype = meta.dtype();
        let rows = self.chunk_rows(class);
        self.store_mut()?
            .create_array(path, dtype, meta.trailing_shape(), rows)?;
        Ok(())
    }
}

fn ensure_growable(backend: &Backend) -> Result<()> {
    if backend.is_growable() && backend.is_writable() {
        Ok(())
    } else {
        Err(TrxError::ImmutableBackend {
            kind: backend.kind(),
        })
    }
}

impl Drop for TrxFile {
    fn drop(&mut self) {
        if let Some(backend) = &self.backend {
            if matches!(backend.kind(), BackendKind::Temporary | BackendKind::Archive) {
                tracing::warn!(
                    target: "trx::lifecycle",
                    backend = %backend.kind(),
                    "container dropped without close; backend was not finalized"
                );
            }
        }
    }
}
