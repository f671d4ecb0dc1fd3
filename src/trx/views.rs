//! Read-only views built fresh from the store on every call, plus whole-container helpers.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use super::{TrxFile, group_data_path, group_path, point_path, streamline_path};
use crate::constants::{OFFSETS, POSITIONS};
use crate::error::{Result, TrxError};
use crate::offsets::{OffsetIndex, RaggedArray};
use crate::store::{ArrayStoreExt, Backend, join_key};
use crate::types::{AppendOptions, NdArray};

/// Schema-clone the first container and append every input to it, in order.
/// An empty list yields a blank container.
pub fn concatenate(inputs: &[&TrxFile]) -> Result<TrxFile> {
    let Some(first) = inputs.first() else {
        return TrxFile::new();
    };
    let mut merged = TrxFile::init_as(first)?;
    for trx in inputs {
        merged.append(trx, AppendOptions::default())?;
    }
    Ok(merged)
}

fn shape_label(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({single},)"),
        dims => {
            let parts: Vec<String> = dims.iter().map(ToString::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

fn render_tree(store: &Backend, path: &str, prefix: &str, out: &mut String) -> Result<()> {
    let mut children: Vec<(String, bool)> = store
        .group_keys(path)?
        .into_iter()
        .map(|name| (name, true))
        .chain(store.array_keys(path)?.into_iter().map(|name| (name, false)))
        .collect();
    children.sort();
    let count = children.len();
    for (i, (name, is_group)) in children.into_iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let child = join_key(path, &name);
        if is_group {
            out.push_str(&format!("{prefix}{branch}{name}\n"));
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_tree(store, &child, &nested, out)?;
        } else {
            let meta = store.array_meta(&child)?;
            out.push_str(&format!(
                "{prefix}{branch}{name} {} {}\n",
                shape_label(&meta.shape),
                meta.dtype()
            ));
        }
    }
    Ok(())
}

impl TrxFile {
    /// Offsets and lengths of every streamline.
    pub fn offset_index(&self) -> Result<OffsetIndex> {
        let offsets = self.store()?.read_array(OFFSETS)?.to_index_vec()?;
        OffsetIndex::new(offsets, self.nb_points()?)
    }

    pub fn streamlines(&self) -> Result<RaggedArray> {
        let positions = self.store()?.read_array(POSITIONS)?;
        RaggedArray::new(positions, self.offset_index()?)
    }

    /// Every per-point array as a ragged view over the streamline partition. 1-D arrays
    /// come back as N×1.
    pub fn data_per_point(&self) -> Result<BTreeMap<String, RaggedArray>> {
        let index = self.offset_index()?;
        let store = self.store()?;
        let mut views = BTreeMap::new();
        for key in self.data_per_point_keys()? {
            let mut data = store.read_array(&point_path(&key))?;
            if data.ndim() == 1 {
                let rows = data.rows();
                data = data.reshape(&[rows, 1])?;
            }
            views.insert(key, RaggedArray::new(data, index.clone())?);
        }
        Ok(views)
    }

    pub fn data_per_streamline(&self) -> Result<BTreeMap<String, NdArray>> {
        let store = self.store()?;
        self.data_per_streamline_keys()?
            .into_iter()
            .map(|key| {
                let data = store.read_array(&streamline_path(&key))?;
                Ok((key, data))
            })
            .collect()
    }

    /// Member streamline ids of every group.
    pub fn groups(&self) -> Result<BTreeMap<String, Vec<u64>>> {
        let store = self.store()?;
        self.group_keys()?
            .into_iter()
            .map(|name| {
                let members = store.read_array(&group_path(&name))?.to_index_vec()?;
                Ok((name, members))
            })
            .collect()
    }

    pub fn data_per_group(&self) -> Result<BTreeMap<String, BTreeMap<String, NdArray>>> {
        let store = self.store()?;
        let mut groups: BTreeMap<String, BTreeMap<String, NdArray>> = BTreeMap::new();
        for (group, key) in self.data_per_group_entries()? {
            let data = store.read_array(&group_data_path(&group, &key))?;
            groups.entry(group).or_default().insert(key, data);
        }
        Ok(groups)
    }

    /// Selection of the members of group `name`, keeping groups.
    pub fn get_group(&self, name: &str) -> Result<TrxFile> {
        let path = group_path(name);
        let store = self.store()?;
        if !store.contains_array(&path)? {
            return Err(TrxError::MissingNode { path });
        }
        let members = store.read_array(&path)?.to_index_vec()?;
        self.select(&members, true)
    }

    /// Selection of a contiguous streamline range. Bounds past the end are clamped.
    pub fn slice(&self, range: Range<u64>) -> Result<TrxFile> {
        let count = self.nb_streamlines()?;
        let end = range.end.min(count);
        let start = range.start.min(end);
        let indices: Vec<u64> = (start..end).collect();
        self.select(&indices, true)
    }

    /// True when no array in the container holds a row.
    pub fn is_empty(&self) -> Result<bool> {
        let mut paths = vec![POSITIONS.to_string(), OFFSETS.to_string()];
        paths.extend(self.data_per_point_keys()?.iter().map(|key| point_path(key)));
        paths.extend(
            self.data_per_streamline_keys()?
                .iter()
                .map(|key| streamline_path(key)),
        );
        paths.extend(self.group_keys()?.iter().map(|name| group_path(name)));
        paths.extend(
            self.data_per_group_entries()?
                .iter()
                .map(|(group, key)| group_data_path(group, key)),
        );
        for path in &paths {
            if self.rows_of(path)? > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Node tree with shapes and dtypes.
    pub fn tree(&self) -> Result<String> {
        let mut out = String::from("/\n");
        render_tree(self.store()?, "", " ", &mut out)?;
        Ok(out)
    }

    fn summary(&self) -> Result<String> {
        let space = self.space_attributes()?;
        let mut text = String::from("VOXEL_TO_RASMM:\n");
        for (i, row) in space.affine.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|value| format!("{value:.6}")).collect();
            let open = if i == 0 { "[[" } else { " [" };
            let close = if i == 3 { "]]" } else { "]" };
            text.push_str(&format!("{open}{}{close}\n", cells.join(" ")));
        }
        let [x, y, z] = space.dimensions;
        text.push_str(&format!("DIMENSIONS: [{x} {y} {z}]\n"));
        let [sx, sy, sz] = space.voxel_sizes();
        text.push_str(&format!("VOX_SIZES: [{sx:.2} {sy:.2} {sz:.2}]\n"));
        text.push_str(&format!("VOX_ORDER: {}\n", space.axis_codes()));
        text.push_str(&format!("NB_STREAMLINES: {}\n", self.nb_streamlines()?));
        text.push_str(&format!("NB_POINTS: {}\n", self.nb_points()?));
        text.push_str(&self.tree()?);
        Ok(text)
    }
}

impl fmt::Display for TrxFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.summary() {
            Ok(text) => f.write_str(&text),
            Err(TrxError::Closed) => f.write_str("TrxFile (closed)"),
            Err(err) => write!(f, "TrxFile (unreadable: {err})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DType, TrxOptions};

    fn sample() -> TrxFile {
        let mut trx = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
        trx.push_streamlines(
            &NdArray::from_rows(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]),
            &[1, 2],
        )
        .unwrap();
        trx.set_data_per_point("fa", &NdArray::from_slice(&[0.1f32, 0.2, 0.3]))
            .unwrap();
        trx.set_group("tail", &[1]).unwrap();
        trx
    }

    #[test]
    fn per_point_views_share_the_streamline_partition() {
        let mut trx = sample();
        let dpp = trx.data_per_point().unwrap();
        let fa = &dpp["fa"];
        assert_eq!(fa.data().shape(), &[3, 1]);
        assert_eq!(fa.get(1).unwrap().to_vec::<f32>().unwrap(), vec![0.2, 0.3]);
        assert_eq!(trx.streamlines().unwrap().index().lengths(), &[1, 2]);
        trx.close().unwrap();
    }

    #[test]
    fn tree_lists_nodes_with_shapes() {
        let mut trx = sample();
        let tree = trx.tree().unwrap();
        assert!(tree.contains("positions (3, 3) float32"));
        assert!(tree.contains("offsets (2,) uint64"));
        assert!(tree.contains("│   └── fa (3,) float32"));
        let text = trx.to_string();
        assert!(text.contains("VOX_ORDER: RAS"));
        assert!(text.contains("NB_STREAMLINES: 2"));
        trx.close().unwrap();
        assert_eq!(trx.to_string(), "TrxFile (closed)");
    }

    #[test]
    fn is_empty_does_not_mutate() {
        let mut blank = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
        blank.set_group("none", &[]).unwrap();
        assert!(blank.is_empty().unwrap());
        assert_eq!(blank.group_keys().unwrap(), vec!["none"]);
        blank.close().unwrap();

        let mut trx = sample();
        assert!(!trx.is_empty().unwrap());
        assert_eq!(
            trx.store().unwrap().array_meta("groups/tail").unwrap().dtype(),
            DType::UInt32
        );
        trx.close().unwrap();
    }

    #[test]
    fn unknown_group_is_missing() {
        let mut trx = sample();
        assert!(matches!(
            trx.get_group("nope"),
            Err(TrxError::MissingNode { .. })
        ));
        trx.close().unwrap();
    }
}
