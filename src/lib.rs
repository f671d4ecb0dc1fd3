#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: accessors and store plumbing are self-describing.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Row counts, chunk indices and byte offsets are bounded by what fits in memory; the
// usize/u64 casts between them are deliberate.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style/complexity
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::format_push_string)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::case_sensitive_file_extension_comparisons)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::unnecessary_wraps)]

//! `trx-core`: tractography containers over a chunked array store.
//!
//! A [`TrxFile`] holds ragged 3D streamlines (`positions` + `offsets`) together with
//! per-point, per-streamline, group and per-group arrays, all kept in step across
//! [`TrxFile::append`], [`TrxFile::select`] and [`TrxFile::prune_metadata`]. Storage is a
//! zarr v3 hierarchy written through `zarrs`, reached via the [`store::Store`] trait and
//! bound to one of the [`Backend`] kinds.

/// The trx-core crate version (matches `Cargo.toml`).
pub const TRX_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod constants;
pub mod error;
pub mod offsets;
pub mod store;
pub mod trx;
pub mod types;

pub use error::{Result, TrxError};
pub use offsets::{OffsetIndex, RaggedArray, compute_lengths};
pub use store::{ArrayStoreExt, Backend, BackendKind, Store};
pub use trx::{Origin, Space, Tractogram, TrxFile, concatenate, load};
pub use types::{
    Affine, AppendOptions, ChunkClass, ChunkPolicy, DType, Element, GroupPolicy,
    IDENTITY_AFFINE, NdArray, SpaceAttributes, SpatialReference, TrxOptions,
};
