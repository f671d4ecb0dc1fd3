//! Removal of empty or orphaned metadata nodes.

use tracing::instrument;

use super::{TrxFile, group_data_path, group_data_root, group_path, point_path, streamline_path};
use crate::error::Result;
use crate::store::ArrayStoreExt;

impl TrxFile {
    /// Delete zero-row arrays (every array with `force`) from the per-point, per-streamline,
    /// group and per-group collections, and per-group data whose group is gone.
    ///
    /// Returns the number of nodes removed. Deletion goes straight to the backend.
    #[instrument(target = "trx::prune", skip_all, fields(force = force))]
    pub fn prune_metadata(&mut self, force: bool) -> Result<usize> {
        let mut doomed = Vec::new();
        let store = self.store()?;
        for key in self.data_per_point_keys()? {
            let path = point_path(&key);
            if force || store.array_meta(&path)?.rows() == 0 {
                doomed.push(path);
            }
        }
        for key in self.data_per_streamline_keys()? {
            let path = streamline_path(&key);
            if force || store.array_meta(&path)?.rows() == 0 {
                doomed.push(path);
            }
        }
        let mut live_groups = Vec::new();
        for name in self.group_keys()? {
            let path = group_path(&name);
            if force || store.array_meta(&path)?.rows() == 0 {
                doomed.push(path);
            } else {
                live_groups.push(name);
            }
        }
        for group in self.data_per_group_groups()? {
            if !live_groups.contains(&group) {
                doomed.push(group_data_root(&group));
                continue;
            }
            for key in self.data_per_group_keys(&group)? {
                let path = group_data_path(&group, &key);
                if force || store.array_meta(&path)?.rows() == 0 {
                    doomed.push(path);
                }
            }
        }

        let store = self.store_mut()?;
        for path in &doomed {
            store.delete_node(path)?;
        }
        if !doomed.is_empty() {
            tracing::debug!(target: "trx::prune", removed = doomed.len(), "pruned metadata");
        }
        Ok(doomed.len())
    }
}
