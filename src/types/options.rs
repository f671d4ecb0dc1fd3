//! Builder-style options for creating containers and appending into them.

use serde::{Deserialize, Serialize};

use super::dtype::DType;
use crate::constants::{
    DEFAULT_GROUP_CHUNK_ROWS, DEFAULT_POINT_CHUNK_ROWS, DEFAULT_STREAMLINE_CHUNK_ROWS,
};
use crate::error::{Result, TrxError};

fn default_point_rows() -> usize {
    DEFAULT_POINT_CHUNK_ROWS
}

fn default_streamline_rows() -> usize {
    DEFAULT_STREAMLINE_CHUNK_ROWS
}

fn default_group_rows() -> usize {
    DEFAULT_GROUP_CHUNK_ROWS
}

fn default_true() -> bool {
    true
}

/// Which scale an array is chunked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkClass {
    /// `positions` and `data_per_point`.
    Point,
    /// `offsets` and `data_per_streamline`.
    Streamline,
    /// `groups` and `data_per_group`.
    Group,
}

/// Rows per chunk for each chunk class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPolicy {
    #[serde(default = "default_point_rows")]
    pub point_rows: usize,
    #[serde(default = "default_streamline_rows")]
    pub streamline_rows: usize,
    #[serde(default = "default_group_rows")]
    pub group_rows: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            point_rows: DEFAULT_POINT_CHUNK_ROWS,
            streamline_rows: DEFAULT_STREAMLINE_CHUNK_ROWS,
            group_rows: DEFAULT_GROUP_CHUNK_ROWS,
        }
    }
}

impl ChunkPolicy {
    #[must_use]
    pub fn rows_for(&self, class: ChunkClass) -> usize {
        let rows = match class {
            ChunkClass::Point => self.point_rows,
            ChunkClass::Streamline => self.streamline_rows,
            ChunkClass::Group => self.group_rows,
        };
        rows.max(1)
    }
}

/// Construction options for a new container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrxOptions {
    /// dtype of `positions` for blank containers; schema clones inherit the template's.
    #[serde(default = "default_positions_dtype")]
    pub positions_dtype: DType,
    #[serde(default)]
    pub chunk_policy: ChunkPolicy,
}

fn default_positions_dtype() -> DType {
    DType::Float32
}

impl Default for TrxOptions {
    fn default() -> Self {
        Self {
            positions_dtype: default_positions_dtype(),
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

impl TrxOptions {
    #[must_use]
    pub fn builder() -> TrxOptionsBuilder {
        TrxOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrxOptionsBuilder {
    inner: TrxOptions,
}

impl TrxOptionsBuilder {
    #[must_use]
    pub fn positions_dtype(mut self, dtype: DType) -> Self {
        self.inner.positions_dtype = dtype;
        self
    }

    #[must_use]
    pub fn chunk_policy(mut self, policy: ChunkPolicy) -> Self {
        self.inner.chunk_policy = policy;
        self
    }

    #[must_use]
    pub fn point_chunk_rows(mut self, rows: usize) -> Self {
        self.inner.chunk_policy.point_rows = rows;
        self
    }

    #[must_use]
    pub fn streamline_chunk_rows(mut self, rows: usize) -> Self {
        self.inner.chunk_policy.streamline_rows = rows;
        self
    }

    #[must_use]
    pub fn group_chunk_rows(mut self, rows: usize) -> Self {
        self.inner.chunk_policy.group_rows = rows;
        self
    }

    #[must_use]
    pub fn build(self) -> TrxOptions {
        self.inner
    }
}

/// What append does with `data_per_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupPolicy {
    /// Drop every per-group array from the target.
    DeletePerGroup,
    /// Keep the target's per-group arrays and extend them with the source's matching ones.
    KeepFirstPerGroup,
}

/// Flags accepted by `TrxFile::append`. Defaults to keeping the first per-group data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOptions {
    #[serde(default)]
    pub delete_per_group: bool,
    #[serde(default = "default_true")]
    pub keep_first_per_group: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            delete_per_group: false,
            keep_first_per_group: true,
        }
    }
}

impl AppendOptions {
    #[must_use]
    pub fn builder() -> AppendOptionsBuilder {
        AppendOptionsBuilder::default()
    }

    /// Resolve the flag pair; `None` when no strategy was requested.
    pub fn group_policy(&self) -> Result<Option<GroupPolicy>> {
        match (self.delete_per_group, self.keep_first_per_group) {
            (true, true) => Err(TrxError::ConflictingPolicy),
            (true, false) => Ok(Some(GroupPolicy::DeletePerGroup)),
            (false, true) => Ok(Some(GroupPolicy::KeepFirstPerGroup)),
            (false, false) => Ok(None),
        }
    }
}

impl From<GroupPolicy> for AppendOptions {
    fn from(policy: GroupPolicy) -> Self {
        Self {
            delete_per_group: policy == GroupPolicy::DeletePerGroup,
            keep_first_per_group: policy == GroupPolicy::KeepFirstPerGroup,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppendOptionsBuilder {
    inner: AppendOptions,
}

impl AppendOptionsBuilder {
    #[must_use]
    pub fn delete_per_group(mut self, enabled: bool) -> Self {
        self.inner.delete_per_group = enabled;
        self
    }

    #[must_use]
    pub fn keep_first_per_group(mut self, enabled: bool) -> Self {
        self.inner.keep_first_per_group = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> AppendOptions {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_policy_resolution() {
        assert_eq!(
            AppendOptions::default().group_policy().unwrap(),
            Some(GroupPolicy::KeepFirstPerGroup)
        );
        let both = AppendOptions::builder().delete_per_group(true).build();
        assert!(matches!(
            both.group_policy(),
            Err(TrxError::ConflictingPolicy)
        ));
        let neither = AppendOptions::builder().keep_first_per_group(false).build();
        assert_eq!(neither.group_policy().unwrap(), None);
        let delete: AppendOptions = GroupPolicy::DeletePerGroup.into();
        assert_eq!(
            delete.group_policy().unwrap(),
            Some(GroupPolicy::DeletePerGroup)
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: TrxOptions = serde_json::from_str(r#"{"positions_dtype":"float64"}"#).unwrap();
        assert_eq!(options.positions_dtype, DType::Float64);
        assert_eq!(options.chunk_policy, ChunkPolicy::default());

        let policy: ChunkPolicy = serde_json::from_str(r#"{"point_rows":0}"#).unwrap();
        assert_eq!(policy.rows_for(ChunkClass::Point), 1);
        assert_eq!(
            policy.rows_for(ChunkClass::Group),
            DEFAULT_GROUP_CHUNK_ROWS
        );
    }
}
