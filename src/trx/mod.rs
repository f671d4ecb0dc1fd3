//! Core `TrxFile` type: a streamline container over one bound array store.
//!
//! `impl TrxFile` is split by concern the same way the container's operations are:
//! construction and backend binding in [`lifecycle`], root attributes in [`metadata`],
//! growth in [`append`], index-based extraction in [`select`], cleanup in [`prune`],
//! read-only views in [`views`], direct population in [`mutation`] and the curve
//! collection bridge in [`tractogram`].

pub mod append;
pub mod lifecycle;
pub mod metadata;
pub mod mutation;
pub mod prune;
pub mod select;
pub mod tractogram;
pub mod views;

pub use lifecycle::load;
pub use tractogram::{Origin, Space, Tractogram};
pub use views::concatenate;

use crate::constants::{DATA_PER_GROUP, DATA_PER_POINT, DATA_PER_STREAMLINE, GROUPS};
use crate::error::{Result, TrxError};
use crate::store::{ArrayStoreExt, Backend, join_key};
use crate::types::{ChunkClass, TrxOptions};

/// A tractography container bound to exactly one [`Backend`].
///
/// The handle owns its backend. [`TrxFile::close`] runs the backend's finalize action;
/// after that every accessor fails with [`TrxError::Closed`].
#[derive(Debug)]
pub struct TrxFile {
    pub(crate) backend: Option<Backend>,
    pub(crate) options: TrxOptions,
}

pub(crate) fn point_path(key: &str) -> String {
    join_key(DATA_PER_POINT, key)
}

pub(crate) fn streamline_path(key: &str) -> String {
    join_key(DATA_PER_STREAMLINE, key)
}

pub(crate) fn group_path(name: &str) -> String {
    join_key(GROUPS, name)
}

pub(crate) fn group_data_root(group: &str) -> String {
    join_key(DATA_PER_GROUP, group)
}

pub(crate) fn group_data_path(group: &str, key: &str) -> String {
    join_key(&group_data_root(group), key)
}

impl TrxFile {
    pub(crate) fn store(&self) -> Result<&Backend> {
        self.backend.as_ref().ok_or(TrxError::Closed)
    }

    pub(crate) fn store_mut(&mut self) -> Result<&mut Backend> {
        self.backend.as_mut().ok_or(TrxError::Closed)
    }

    /// The bound backend, if the container is still open.
    #[must_use]
    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &TrxOptions {
        &self.options
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    pub(crate) fn chunk_rows(&self, class: ChunkClass) -> usize {
        self.options.chunk_policy.rows_for(class)
    }

    pub fn data_per_point_keys(&self) -> Result<Vec<String>> {
        self.store()?.array_keys(DATA_PER_POINT)
    }

    pub fn data_per_streamline_keys(&self) -> Result<Vec<String>> {
        self.store()?.array_keys(DATA_PER_STREAMLINE)
    }

    pub fn group_keys(&self) -> Result<Vec<String>> {
        self.store()?.array_keys(GROUPS)
    }

    /// Groups that own a `data_per_group` node, whether or not the group still exists.
    pub fn data_per_group_groups(&self) -> Result<Vec<String>> {
        self.store()?.group_keys(DATA_PER_GROUP)
    }

    pub fn data_per_group_keys(&self, group: &str) -> Result<Vec<String>> {
        self.store()?.array_keys(&group_data_root(group))
    }

    /// Every `(group, key)` pair under `data_per_group`.
    pub(crate) fn data_per_group_entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for group in self.data_per_group_groups()? {
            for key in self.data_per_group_keys(&group)? {
                entries.push((group.clone(), key));
            }
        }
        Ok(entries)
    }

    pub(crate) fn rows_of(&self, path: &str) -> Result<usize> {
        Ok(self.store()?.array_meta(path)?.rows())
    }
}
