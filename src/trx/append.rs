//! In-place growth of a container from another one.
//!
//! Every precondition is checked before the first write. Once rows start moving there is
//! no rollback: a failure part-way leaves the target partially grown, so callers that
//! need to recover should `deepcopy` first.

use std::collections::BTreeSet;

use tracing::instrument;

use super::{TrxFile, group_data_path, group_path, point_path, streamline_path};
use crate::constants::{COPY_BLOCK_ROWS, DATA_PER_GROUP, OFFSETS, POSITIONS};
use crate::error::{Result, TrxError};
use crate::store::{ArrayReader, ArrayStoreExt, Backend, Store};
use crate::types::{AppendOptions, GroupPolicy, NdArray};

/// Fail unless both arrays exist with the same trailing shape. Differing dtypes are
/// fine: rows are cast to the target's dtype while copying.
fn ensure_rows_compatible(target: &Backend, source: &Backend, path: &str) -> Result<()> {
    let ours = target.array_meta(path)?;
    let theirs = source.array_meta(path)?;
    if ours.trailing_shape() != theirs.trailing_shape() {
        return Err(TrxError::ShapeMismatch {
            path: path.to_string(),
            reason: format!(
                "{} {:?} cannot take rows of {} {:?}",
                ours.dtype,
                ours.trailing_shape(),
                theirs.dtype,
                theirs.trailing_shape()
            ),
        });
    }
    Ok(())
}

fn ensure_same_keys(
    collection: &'static str,
    ours: Vec<String>,
    theirs: Vec<String>,
) -> Result<()> {
    let (left, right): (BTreeSet<_>, BTreeSet<_>) =
        (ours.iter().collect(), theirs.iter().collect());
    if left == right {
        Ok(())
    } else {
        Err(TrxError::KeySetMismatch {
            collection,
            ours,
            theirs,
        })
    }
}

/// Append every row of `source[path]` to `target[path]`, one block at a time, casting
/// to the target's dtype when the two differ.
pub(crate) fn copy_rows(target: &mut Backend, source: &Backend, path: &str) -> Result<()> {
    let dtype = target.array_meta(path)?.dtype();
    let reader = ArrayReader::open(source, path)?;
    if reader.dtype() != dtype {
        log::debug!("casting {path} from {} to {dtype}", reader.dtype());
    }
    let rows = reader.rows();
    let mut start = 0;
    while start < rows {
        let end = rows.min(start + COPY_BLOCK_ROWS);
        let block = reader.read_rows(start..end)?;
        let block = if block.dtype() == dtype {
            block
        } else {
            NdArray::from_f64_as(dtype, &block.to_f64_vec()?, block.shape())?
        };
        target.append_rows(path, &block)?;
        start = end;
    }
    Ok(())
}

/// Like [`copy_rows`] for index arrays, adding `shift` to every value and encoding in
/// the target's dtype.
fn copy_shifted(target: &mut Backend, source: &Backend, path: &str, shift: u64) -> Result<()> {
    let dtype = target.array_meta(path)?.dtype();
    let reader = ArrayReader::open(source, path)?;
    let rows = reader.rows();
    let mut start = 0;
    while start < rows {
        let end = rows.min(start + COPY_BLOCK_ROWS);
        let values: Vec<u64> = reader
            .read_rows(start..end)?
            .to_index_vec()?
            .into_iter()
            .map(|value| value + shift)
            .collect();
        let block = NdArray::from_indices_as(dtype, &values, &[values.len()])?;
        target.append_rows(path, &block)?;
        start = end;
    }
    Ok(())
}

impl TrxFile {
    /// Grow `self` with the streamlines and data of `source`.
    ///
    /// Fails before touching `self` on mismatched space attributes, a non-growable
    /// backend, conflicting or missing group policy, per-point/per-streamline key sets
    /// that differ while both sides hold data, or incompatible per-group arrays under
    /// [`GroupPolicy::KeepFirstPerGroup`].
    #[instrument(
        target = "trx::append",
        skip_all,
        fields(delete_per_group = options.delete_per_group, keep_first_per_group = options.keep_first_per_group)
    )]
    pub fn append(&mut self, source: &TrxFile, options: AppendOptions) -> Result<()> {
        self.space_attributes()?
            .ensure_compatible(&source.space_attributes()?)?;

        let target_store = self.store()?;
        if !target_store.is_growable() || !target_store.is_writable() {
            return Err(TrxError::ImmutableBackend {
                kind: target_store.kind(),
            });
        }

        let policy = options.group_policy()?;

        let target_empty = self.is_empty()?;
        let source_empty = source.is_empty()?;
        if !target_empty && !source_empty {
            ensure_same_keys(
                "data_per_point",
                self.data_per_point_keys()?,
                source.data_per_point_keys()?,
            )?;
            ensure_same_keys(
                "data_per_streamline",
                self.data_per_streamline_keys()?,
                source.data_per_streamline_keys()?,
            )?;
        }

        let target_groups = self.data_per_group_entries()?;
        let source_groups = source.data_per_group_entries()?;
        if policy.is_none() && (!target_groups.is_empty() || !source_groups.is_empty()) {
            return Err(TrxError::AmbiguousGroupPolicy);
        }

        let source_store = source.store()?;
        ensure_rows_compatible(target_store, source_store, POSITIONS)?;
        if !source_empty {
            for key in self.data_per_point_keys()? {
                let path = point_path(&key);
                if source_store.contains_array(&path)? {
                    ensure_rows_compatible(target_store, source_store, &path)?;
                }
            }
            for key in self.data_per_streamline_keys()? {
                let path = streamline_path(&key);
                if source_store.contains_array(&path)? {
                    ensure_rows_compatible(target_store, source_store, &path)?;
                }
            }
        }
        if policy == Some(GroupPolicy::KeepFirstPerGroup) {
            for (group, key) in &target_groups {
                if source_groups.contains(&(group.clone(), key.clone())) {
                    ensure_rows_compatible(
                        target_store,
                        source_store,
                        &group_data_path(group, key),
                    )?;
                }
            }
        }

        let points_before = self.nb_points()?;
        let streamlines_before = self.nb_streamlines()?;
        let source_points = source.nb_points()?;
        let source_streamlines = source.nb_streamlines()?;
        let point_keys = self.data_per_point_keys()?;
        let streamline_keys = self.data_per_streamline_keys()?;
        let group_names = self.group_keys()?;

        let target = self.store_mut()?;
        copy_rows(target, source_store, POSITIONS)?;
        copy_shifted(target, source_store, OFFSETS, points_before)?;
        self.set_nb_points(points_before + source_points)?;
        self.set_nb_streamlines(streamlines_before + source_streamlines)?;

        if source_empty {
            tracing::debug!(target: "trx::append", "source is empty; counts updated only");
            return Ok(());
        }

        let target = self.store_mut()?;
        for key in &point_keys {
            copy_rows(target, source_store, &point_path(key))?;
        }
        for key in &streamline_keys {
            copy_rows(target, source_store, &streamline_path(key))?;
        }
        for name in &group_names {
            let path = group_path(name);
            if source_store.contains_array(&path)? {
                copy_shifted(target, source_store, &path, streamlines_before)?;
            }
        }

        match policy {
            Some(GroupPolicy::KeepFirstPerGroup) => {
                for (group, key) in &target_groups {
                    if source_groups.contains(&(group.clone(), key.clone())) {
                        copy_rows(target, source_store, &group_data_path(group, key))?;
                    }
                }
            }
            Some(GroupPolicy::DeletePerGroup) => {
                target.remove_prefix(DATA_PER_GROUP)?;
                target.create_group(DATA_PER_GROUP)?;
            }
            None => {}
        }

        tracing::info!(
            target: "trx::append",
            streamlines = streamlines_before + source_streamlines,
            points = points_before + source_points,
            "append complete"
        );
        Ok(())
    }
}
