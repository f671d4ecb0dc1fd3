//! Public types exposed by the `trx-core` crate.

pub mod array;
pub mod dtype;
pub mod options;
pub mod space;

pub use array::{NdArray, Shape};
pub use dtype::{DType, Element};
pub use options::{
    AppendOptions, AppendOptionsBuilder, ChunkClass, ChunkPolicy, GroupPolicy, TrxOptions,
    TrxOptionsBuilder,
};
pub use space::{Affine, IDENTITY_AFFINE, SpaceAttributes, SpatialReference};
