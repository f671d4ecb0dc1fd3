use std::path::PathBuf;

use thiserror::Error;

use crate::store::BackendKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TrxError>;

#[derive(Debug, Error)]
pub enum TrxError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("array storage error: {0}")]
    Storage(#[from] zarrs::storage::StorageError),

    #[error("invalid store key: {0}")]
    StoreKey(#[from] zarrs::storage::StoreKeyError),

    #[error("invalid store prefix: {0}")]
    StorePrefix(#[from] zarrs::storage::StorePrefixError),

    #[error("array I/O error: {0}")]
    Array(#[from] zarrs::array::ArrayError),

    #[error("cannot open or create array: {0}")]
    ArrayCreate(#[from] zarrs::array::ArrayCreateError),

    #[error("cannot open or create group: {0}")]
    GroupCreate(#[from] zarrs::group::GroupCreateError),

    #[error("mismatched space attributes between containers: {reason}")]
    SchemaMismatch { reason: String },

    #[error(
        "cannot grow a {kind} backend; unpack it, save to a directory, or init a new container from it"
    )]
    ImmutableBackend { kind: BackendKind },

    #[error("choose a strategy for data_per_group: delete or keep first")]
    AmbiguousGroupPolicy,

    #[error("cannot delete and keep data_per_group at the same time")]
    ConflictingPolicy,

    #[error("{collection} keys must match to append (ours: {ours:?}, theirs: {theirs:?})")]
    KeySetMismatch {
        collection: &'static str,
        ours: Vec<String>,
        theirs: Vec<String>,
    },

    #[error("streamline index {index} out of range for {count} streamlines")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("invalid backend path {path}: {reason}")]
    InvalidBackendPath { path: PathBuf, reason: String },

    #[error("node not found: {path}")]
    MissingNode { path: String },

    #[error("shape mismatch for {path}: {reason}")]
    ShapeMismatch { path: String, reason: String },

    #[error("unsupported dtype {dtype}")]
    UnsupportedDType { dtype: String },

    #[error("invalid metadata attribute {key}: {reason}")]
    InvalidMetadata { key: String, reason: String },

    #[error("invalid array layout at {path}: {reason}")]
    InvalidLayout { path: String, reason: String },

    #[error("container is closed; its backend has been released")]
    Closed,
}
