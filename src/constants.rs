//! Layout names and numeric defaults shared across the crate.

/// Root attribute holding the 4x4 voxel-to-RAS+mm affine (row-major nested lists).
pub const ATTR_VOXEL_TO_RASMM: &str = "VOXEL_TO_RASMM";
/// Root attribute holding the three grid dimensions.
pub const ATTR_DIMENSIONS: &str = "DIMENSIONS";
pub const ATTR_NB_STREAMLINES: &str = "NB_STREAMLINES";
pub const ATTR_NB_POINTS: &str = "NB_POINTS";

pub const POSITIONS: &str = "positions";
pub const OFFSETS: &str = "offsets";
pub const DATA_PER_POINT: &str = "data_per_point";
pub const DATA_PER_STREAMLINE: &str = "data_per_streamline";
pub const DATA_PER_GROUP: &str = "data_per_group";
pub const GROUPS: &str = "groups";

/// Per-node metadata document of a zarr v3 hierarchy.
pub const NODE_METADATA_KEY: &str = "zarr.json";

/// Chunk rows for point-scale arrays (positions, data_per_point).
pub const DEFAULT_POINT_CHUNK_ROWS: usize = 1_000_000;
/// Chunk rows for streamline-scale arrays (offsets, data_per_streamline).
pub const DEFAULT_STREAMLINE_CHUNK_ROWS: usize = 100_000;
/// Chunk rows for group-scale arrays (groups, data_per_group).
pub const DEFAULT_GROUP_CHUNK_ROWS: usize = 10_000;

/// Upper bound on rows buffered in memory while copying or gathering an array.
pub const COPY_BLOCK_ROWS: usize = 1_000_000;

/// Same defaults as `numpy.allclose`.
pub const AFFINE_RTOL: f64 = 1e-5;
pub const AFFINE_ATOL: f64 = 1e-8;

/// Extensions that select the archive backend.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "trx"];
