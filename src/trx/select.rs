//! Index-based extraction into a new container.
//!
//! Output order is selection order. Duplicated indices duplicate rows, and every
//! occurrence of a group member in the selection becomes one membership in the output.

use std::collections::HashSet;
use std::ops::Range;

use tracing::instrument;

use super::{TrxFile, group_data_path, group_data_root, group_path, point_path, streamline_path};
use crate::constants::{COPY_BLOCK_ROWS, GROUPS, OFFSETS, POSITIONS};
use crate::error::{Result, TrxError};
use crate::offsets::OffsetIndex;
use crate::store::{ArrayReader, ArrayStoreExt, Backend, Store};
use crate::types::NdArray;

/// Split `ranges` into consecutive batches of at most `COPY_BLOCK_ROWS` rows. A single
/// range longer than the limit gets a batch of its own.
fn batch_ranges(ranges: &[Range<usize>]) -> Vec<&[Range<usize>]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut rows = 0;
    for (i, range) in ranges.iter().enumerate() {
        if rows > 0 && rows + range.len() > COPY_BLOCK_ROWS {
            batches.push(&ranges[start..i]);
            start = i;
            rows = 0;
        }
        rows += range.len();
    }
    if start < ranges.len() {
        batches.push(&ranges[start..]);
    }
    batches
}

/// Output positions of every occurrence in `indices` whose id is in `members`.
pub(crate) fn remap_group(members: &[u64], indices: &[u64]) -> Vec<u64> {
    let members: HashSet<u64> = members.iter().copied().collect();
    indices
        .iter()
        .enumerate()
        .filter(|(_, index)| members.contains(*index))
        .map(|(position, _)| position as u64)
        .collect()
}

fn gather_ragged(
    target: &mut Backend,
    source: &Backend,
    path: &str,
    ranges: &[Range<usize>],
) -> Result<()> {
    let reader = ArrayReader::open(source, path)?;
    for batch in batch_ranges(ranges) {
        let block = reader.gather_ranges(batch.iter().cloned())?;
        target.append_rows(path, &block)?;
    }
    Ok(())
}

fn gather_rows(target: &mut Backend, source: &Backend, path: &str, rows: &[usize]) -> Result<()> {
    let reader = ArrayReader::open(source, path)?;
    for batch in rows.chunks(COPY_BLOCK_ROWS) {
        let block = reader.take_rows(batch)?;
        target.append_rows(path, &block)?;
    }
    Ok(())
}

impl TrxFile {
    /// New container holding the streamlines at `indices`, in that order.
    ///
    /// The result lives in a temporary directory; see [`TrxFile::select_into`].
    pub fn select(&self, indices: &[u64], keep_group: bool) -> Result<TrxFile> {
        self.select_into(indices, keep_group, Backend::temporary()?)
    }

    /// Like [`TrxFile::select`], building the result in `backend`.
    #[instrument(
        target = "trx::select",
        skip_all,
        fields(indices = indices.len(), keep_group = keep_group, kind = %backend.kind())
    )]
    pub fn select_into(
        &self,
        indices: &[u64],
        keep_group: bool,
        backend: Backend,
    ) -> Result<TrxFile> {
        let count = self.nb_streamlines()?;
        if let Some(&index) = indices.iter().find(|&&index| index >= count) {
            return Err(TrxError::IndexOutOfRange { index, count });
        }

        let mut selected = TrxFile::init_as_in(self, backend)?;
        if indices.is_empty() {
            selected.prune_metadata(false)?;
            return Ok(selected);
        }

        let source = self.store()?;
        #[allow(clippy::cast_possible_truncation)]
        let rows: Vec<usize> = indices.iter().map(|&index| index as usize).collect();
        let (ranges, lengths) = self.offset_index()?.ranges_for(&rows)?;
        let new_index = OffsetIndex::from_lengths(lengths);

        let point_keys = self.data_per_point_keys()?;
        let streamline_keys = self.data_per_streamline_keys()?;
        let group_names = self.group_keys()?;
        let per_group = self.data_per_group_entries()?;

        let target = selected.store_mut()?;
        gather_ragged(target, source, POSITIONS, &ranges)?;
        let offsets_dtype = target.array_meta(OFFSETS)?.dtype();
        target.append_rows(
            OFFSETS,
            &NdArray::from_indices_as(offsets_dtype, new_index.offsets(), &[new_index.len()])?,
        )?;

        for key in &point_keys {
            gather_ragged(target, source, &point_path(key), &ranges)?;
        }
        for key in &streamline_keys {
            gather_rows(target, source, &streamline_path(key), &rows)?;
        }

        let mut survivors = HashSet::new();
        if keep_group {
            for name in &group_names {
                let path = group_path(name);
                let members = source.read_array(&path)?.to_index_vec()?;
                let remapped = remap_group(&members, indices);
                if remapped.is_empty() {
                    target.delete_node(&path)?;
                    continue;
                }
                let dtype = target.array_meta(&path)?.dtype();
                target.append_rows(
                    &path,
                    &NdArray::from_indices_as(dtype, &remapped, &[remapped.len()])?,
                )?;
                survivors.insert(name.clone());
            }
        } else {
            target.remove_prefix(GROUPS)?;
            target.create_group(GROUPS)?;
        }

        for (group, key) in &per_group {
            if survivors.contains(group) {
                let path = group_data_path(group, key);
                if target.contains_array(&path)? {
                    super::append::copy_rows(target, source, &path)?;
                }
            } else {
                target.delete_node(&group_data_root(group))?;
            }
        }

        let nb_streamlines = target.array_meta(OFFSETS)?.rows() as u64;
        let nb_points = target.array_meta(POSITIONS)?.rows() as u64;
        selected.set_nb_streamlines(nb_streamlines)?;
        selected.set_nb_points(nb_points)?;
        selected.prune_metadata(false)?;

        tracing::debug!(
            target: "trx::select",
            nb_streamlines,
            nb_points,
            groups = survivors.len(),
            "selection built"
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_counts_each_occurrence() {
        assert_eq!(remap_group(&[0, 2], &[2, 0, 1]), vec![0, 1]);
        assert_eq!(remap_group(&[1], &[1, 0, 1]), vec![0, 2]);
        assert_eq!(remap_group(&[1, 1], &[1]), vec![0]);
        assert!(remap_group(&[3], &[0, 1]).is_empty());
    }

    #[test]
    fn batches_respect_block_limit() {
        let ranges = vec![0..COPY_BLOCK_ROWS - 1, 5..7, 7..8, 0..COPY_BLOCK_ROWS + 3];
        let batches = batch_ranges(&ranges);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
        assert!(batch_ranges(&[]).is_empty());
    }
}
