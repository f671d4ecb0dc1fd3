//! Direct population of a container: streamlines and named arrays.
//!
//! Every write keeps the row-count invariants: per-point arrays match `NB_POINTS`,
//! per-streamline arrays match `NB_STREAMLINES`, group members are in range, and
//! per-group arrays hang off an existing group.

use super::{TrxFile, group_data_path, group_path, point_path, streamline_path};
use crate::constants::{OFFSETS, POSITIONS};
use crate::error::{Result, TrxError};
use crate::offsets::OffsetIndex;
use crate::store::ArrayStoreExt;
use crate::types::{ChunkClass, DType, NdArray};

fn row_mismatch(path: &str, rows: usize, expected: u64) -> TrxError {
    TrxError::ShapeMismatch {
        path: path.to_string(),
        reason: format!("{rows} rows, expected {expected}"),
    }
}

impl TrxFile {
    /// Append streamlines given as a flat N×3 point block and one length per streamline.
    ///
    /// Only allowed while no per-point or per-streamline array exists, since those would
    /// fall out of step with the new counts.
    pub fn push_streamlines(&mut self, positions: &NdArray, lengths: &[u64]) -> Result<()> {
        let total: u64 = lengths.iter().sum();
        if positions.rows() as u64 != total {
            return Err(row_mismatch(POSITIONS, positions.rows(), total));
        }
        if !self.data_per_point_keys()?.is_empty() || !self.data_per_streamline_keys()?.is_empty()
        {
            return Err(TrxError::ShapeMismatch {
                path: POSITIONS.to_string(),
                reason: "cannot add streamlines once per-point or per-streamline data exists"
                    .into(),
            });
        }
        let nb_points = self.nb_points()?;
        let nb_streamlines = self.nb_streamlines()?;
        let offsets = OffsetIndex::from_lengths(lengths.to_vec()).shifted(nb_points);
        let offsets_dtype = self.store()?.array_meta(OFFSETS)?.dtype();
        let offsets = NdArray::from_indices_as(offsets_dtype, &offsets, &[offsets.len()])?;

        let store = self.store_mut()?;
        store.append_rows(POSITIONS, positions)?;
        store.append_rows(OFFSETS, &offsets)?;
        self.set_nb_points(nb_points + total)?;
        self.set_nb_streamlines(nb_streamlines + lengths.len() as u64)?;
        Ok(())
    }

    /// Create or replace a per-point array. 1-D arrays are stored as given.
    pub fn set_data_per_point(&mut self, key: &str, data: &NdArray) -> Result<()> {
        let path = point_path(key);
        let expected = self.nb_points()?;
        if data.rows() as u64 != expected {
            return Err(row_mismatch(&path, data.rows(), expected));
        }
        let rows = self.chunk_rows(ChunkClass::Point);
        self.store_mut()?.create_array_with(&path, data, rows)
    }

    pub fn set_data_per_streamline(&mut self, key: &str, data: &NdArray) -> Result<()> {
        let path = streamline_path(key);
        let expected = self.nb_streamlines()?;
        if data.rows() as u64 != expected {
            return Err(row_mismatch(&path, data.rows(), expected));
        }
        let rows = self.chunk_rows(ChunkClass::Streamline);
        self.store_mut()?.create_array_with(&path, data, rows)
    }

    /// Create or replace a group with the given member streamlines, stored as `uint32`.
    pub fn set_group(&mut self, name: &str, members: &[u64]) -> Result<()> {
        self.set_group_as(name, members, DType::UInt32)
    }

    pub fn set_group_as(&mut self, name: &str, members: &[u64], dtype: DType) -> Result<()> {
        let count = self.nb_streamlines()?;
        if let Some(&index) = members.iter().find(|&&member| member >= count) {
            return Err(TrxError::IndexOutOfRange { index, count });
        }
        let data = NdArray::from_indices_as(dtype, members, &[members.len()])?;
        let rows = self.chunk_rows(ChunkClass::Group);
        self.store_mut()?
            .create_array_with(&group_path(name), &data, rows)
    }

    /// Create or replace an array scoped to an existing group.
    pub fn set_data_per_group(&mut self, group: &str, key: &str, data: &NdArray) -> Result<()> {
        let store = self.store()?;
        if !store.contains_array(&group_path(group))? {
            return Err(TrxError::MissingNode {
                path: group_path(group),
            });
        }
        let rows = self.chunk_rows(ChunkClass::Group);
        self.store_mut()?
            .create_array_with(&group_data_path(group, key), data, rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TrxError;
    use crate::store::Backend;
    use crate::trx::TrxFile;
    use crate::types::{NdArray, TrxOptions};

    #[test]
    fn population_keeps_counts_in_step() {
        let mut trx = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
        let points = NdArray::from_rows(&[[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        assert!(trx.push_streamlines(&points, &[1, 1]).is_err());
        trx.push_streamlines(&points, &[2, 1]).unwrap();
        trx.push_streamlines(&points, &[3]).unwrap();
        assert_eq!(trx.nb_streamlines().unwrap(), 3);
        assert_eq!(trx.nb_points().unwrap(), 6);
        assert_eq!(trx.streamlines().unwrap().index().offsets(), &[0, 2, 3]);

        assert!(matches!(
            trx.set_data_per_point("fa", &NdArray::from_slice(&[0.1f32; 5])),
            Err(TrxError::ShapeMismatch { .. })
        ));
        trx.set_data_per_point("fa", &NdArray::from_slice(&[0.1f32; 6]))
            .unwrap();
        assert!(trx.push_streamlines(&points, &[3]).is_err());

        assert!(matches!(
            trx.set_group("cst", &[0, 3]),
            Err(TrxError::IndexOutOfRange { index: 3, count: 3 })
        ));
        assert!(matches!(
            trx.set_data_per_group("cst", "color", &NdArray::from_slice(&[1u8])),
            Err(TrxError::MissingNode { .. })
        ));
        trx.set_group("cst", &[0, 2]).unwrap();
        trx.set_data_per_group("cst", "color", &NdArray::from_rows(&[[1u8, 2, 3]]))
            .unwrap();
        assert_eq!(trx.data_per_group_keys("cst").unwrap(), vec!["color"]);
        trx.close().unwrap();
    }
}
