//! Groups, chunked arrays and attributes on top of `zarrs`.
//!
//! Every node is a zarr v3 node described by its `zarr.json`. Arrays are chunked along
//! the first dimension only; trailing chunk dimensions equal the trailing shape, so a
//! chunk is a block of whole rows. Node paths are relative (`groups/bundle`) and the
//! root group is `""`.

use std::num::NonZeroU64;
use std::ops::Range;

use serde_json::{Map, Value};
use zarrs::array::chunk_grid::RegularChunkGrid;
use zarrs::array::{Array, ArrayBuilder, ChunkGrid, ChunkShape};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::ReadableWritableListableStorageTraits;

use super::Store;
use crate::constants::NODE_METADATA_KEY;
use crate::error::{Result, TrxError};
use crate::types::dtype::with_element_type;
use crate::types::{DType, Element, NdArray};

/// Array handle over the type-erased storage of a backend.
pub type ZarrArray = Array<dyn ReadableWritableListableStorageTraits>;

/// Join a node path and a child name.
#[must_use]
pub fn join_key(path: &str, leaf: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        leaf.to_string()
    } else {
        format!("{path}/{leaf}")
    }
}

/// Absolute `zarrs` node path for a relative node path.
#[must_use]
pub fn node_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Array,
}

/// Shape and element type of a stored array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayMeta {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl ArrayMeta {
    fn from_array(path: &str, array: &ZarrArray) -> Result<Self> {
        let dtype = DType::from_zarrs(array.data_type())?;
        if array.shape().is_empty() {
            return Err(TrxError::InvalidLayout {
                path: path.to_string(),
                reason: "zero-dimensional arrays carry no rows".into(),
            });
        }
        let shape = array
            .shape()
            .iter()
            .map(|&dim| to_usize(path, dim))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dtype, shape })
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    #[must_use]
    pub fn trailing_shape(&self) -> &[usize] {
        &self.shape[1..]
    }
}

fn to_usize(path: &str, value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| TrxError::InvalidLayout {
        path: path.to_string(),
        reason: format!("dimension {value} does not fit in memory"),
    })
}

/// Subset covering `rows` and the whole of every trailing dimension.
fn row_subset(rows: Range<usize>, trailing: &[usize]) -> ArraySubset {
    let mut ranges = Vec::with_capacity(trailing.len() + 1);
    ranges.push(rows.start as u64..rows.end as u64);
    ranges.extend(trailing.iter().map(|&dim| 0..dim as u64));
    ArraySubset::new_with_ranges(&ranges)
}

fn retrieve_bytes<T: Element>(array: &ZarrArray, subset: &ArraySubset) -> Result<Vec<u8>> {
    let values = array.retrieve_array_subset_elements::<T>(subset)?;
    let mut bytes = Vec::with_capacity(values.len() * T::DTYPE.itemsize());
    for value in values {
        value.write_le(&mut bytes);
    }
    Ok(bytes)
}

fn store_bytes<T: Element>(array: &ZarrArray, subset: &ArraySubset, data: &NdArray) -> Result<()> {
    let values = data.to_vec::<T>()?;
    array.store_array_subset_elements::<T>(subset, &values)?;
    Ok(())
}

/// Row reader over one stored array.
pub struct ArrayReader {
    path: String,
    array: ZarrArray,
    meta: ArrayMeta,
}

impl ArrayReader {
    pub fn open<S: Store + ?Sized>(store: &S, path: &str) -> Result<Self> {
        let array = store.open_array(path)?;
        let meta = ArrayMeta::from_array(path, &array)?;
        Ok(Self {
            path: path.to_string(),
            array,
            meta,
        })
    }

    #[must_use]
    pub fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.meta.rows()
    }

    /// Concatenate row ranges in iteration order. Touching ranges are read in one go.
    pub fn gather_ranges<I>(&self, ranges: I) -> Result<NdArray>
    where
        I: IntoIterator<Item = Range<usize>>,
    {
        let total = self.rows();
        let mut merged: Vec<Range<usize>> = Vec::new();
        for range in ranges {
            if range.start > range.end || range.end > total {
                return Err(TrxError::ShapeMismatch {
                    path: self.path.clone(),
                    reason: format!("row range {range:?} outside {total} rows"),
                });
            }
            match merged.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ if range.is_empty() => {}
                _ => merged.push(range),
            }
        }

        let trailing = self.meta.trailing_shape();
        let mut data = Vec::new();
        let mut rows = 0;
        for range in merged {
            rows += range.len();
            let subset = row_subset(range, trailing);
            let block = with_element_type!(self.meta.dtype, T => {
                retrieve_bytes::<T>(&self.array, &subset)?
            });
            data.extend_from_slice(&block);
        }
        let mut shape = self.meta.shape.clone();
        shape[0] = rows;
        NdArray::new(self.meta.dtype, &shape, data)
    }

    pub fn read_rows(&self, range: Range<usize>) -> Result<NdArray> {
        self.gather_ranges(std::iter::once(range))
    }

    /// Row-gather in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Result<NdArray> {
        self.gather_ranges(rows.iter().map(|&row| row..row + 1))
    }
}

/// Group/array/attribute operations available on every [`Store`].
pub trait ArrayStoreExt: Store {
    /// Kind of node at `path`, read from its `zarr.json`.
    fn node_kind(&self, path: &str) -> Result<Option<NodeKind>> {
        let Some(bytes) = self.get(&join_key(path, NODE_METADATA_KEY))? else {
            return Ok(None);
        };
        let document: Value = serde_json::from_slice(&bytes)?;
        match document.get("node_type").and_then(Value::as_str) {
            Some("group") => Ok(Some(NodeKind::Group)),
            Some("array") => Ok(Some(NodeKind::Array)),
            other => Err(TrxError::InvalidLayout {
                path: node_path(path),
                reason: format!("unknown node_type {other:?}"),
            }),
        }
    }

    /// Create the group at `path` and any missing ancestors.
    fn create_group(&mut self, path: &str) -> Result<()> {
        self.ensure_writable()?;
        let mut current = String::new();
        let parts = path.split('/').filter(|part| !part.is_empty());
        for part in std::iter::once("").chain(parts) {
            current = join_key(&current, part);
            if self.node_kind(&current)?.is_none() {
                GroupBuilder::new()
                    .build(self.storage().clone(), &node_path(&current))?
                    .store_metadata()?;
            }
        }
        Ok(())
    }

    fn contains_group(&self, path: &str) -> Result<bool> {
        Ok(self.node_kind(path)? == Some(NodeKind::Group))
    }

    fn contains_array(&self, path: &str) -> Result<bool> {
        Ok(self.node_kind(path)? == Some(NodeKind::Array))
    }

    fn open_array(&self, path: &str) -> Result<ZarrArray> {
        if !self.contains_array(path)? {
            return Err(TrxError::MissingNode {
                path: path.to_string(),
            });
        }
        Ok(Array::open(self.storage().clone(), &node_path(path))?)
    }

    fn array_meta(&self, path: &str) -> Result<ArrayMeta> {
        ArrayMeta::from_array(path, &self.open_array(path)?)
    }

    /// Create (or replace) an empty array with `trailing` dimensions, chunked every
    /// `chunk_rows` rows.
    fn create_array(
        &mut self,
        path: &str,
        dtype: DType,
        trailing: &[usize],
        chunk_rows: usize,
    ) -> Result<ArrayMeta> {
        self.ensure_writable()?;
        if self.node_kind(path)?.is_some() {
            self.remove_prefix(path)?;
        }
        match path.rsplit_once('/') {
            Some((parent, _)) => self.create_group(parent)?,
            None => self.create_group("")?,
        }

        let mut shape = Vec::with_capacity(trailing.len() + 1);
        shape.push(0u64);
        shape.extend(trailing.iter().map(|&dim| dim as u64));
        let chunk_shape: Vec<NonZeroU64> = std::iter::once(chunk_rows as u64)
            .chain(trailing.iter().map(|&dim| dim as u64))
            .map(|dim| NonZeroU64::new(dim).unwrap_or(NonZeroU64::MIN))
            .collect();
        let chunk_grid = ChunkGrid::new(RegularChunkGrid::new(ChunkShape::from(chunk_shape)));

        let array = ArrayBuilder::new(shape, dtype.to_zarrs(), chunk_grid, dtype.fill_value())
            .build(self.storage().clone(), &node_path(path))?;
        array.store_metadata()?;
        ArrayMeta::from_array(path, &array)
    }

    fn create_array_with(&mut self, path: &str, data: &NdArray, chunk_rows: usize) -> Result<()> {
        self.create_array(path, data.dtype(), data.trailing_shape(), chunk_rows)?;
        self.append_rows(path, data)
    }

    fn read_rows(&self, path: &str, range: Range<usize>) -> Result<NdArray> {
        ArrayReader::open(self, path)?.read_rows(range)
    }

    fn read_array(&self, path: &str) -> Result<NdArray> {
        let reader = ArrayReader::open(self, path)?;
        reader.read_rows(0..reader.rows())
    }

    /// Grow the first dimension by `data.rows()` and write the new rows.
    fn append_rows(&mut self, path: &str, data: &NdArray) -> Result<()> {
        self.ensure_writable()?;
        let mut array = self.open_array(path)?;
        let meta = ArrayMeta::from_array(path, &array)?;
        if data.dtype() != meta.dtype || data.trailing_shape() != meta.trailing_shape() {
            return Err(TrxError::ShapeMismatch {
                path: path.to_string(),
                reason: format!(
                    "cannot append {} {:?} rows to {} {:?} rows",
                    data.dtype(),
                    data.trailing_shape(),
                    meta.dtype,
                    meta.trailing_shape()
                ),
            });
        }
        if data.rows() == 0 {
            return Ok(());
        }

        let old = meta.rows();
        let new = old + data.rows();
        let mut shape = array.shape().to_vec();
        shape[0] = new as u64;
        array.set_shape(shape);
        let subset = row_subset(old..new, meta.trailing_shape());
        with_element_type!(meta.dtype, T => store_bytes::<T>(&array, &subset, data)?);
        array.store_metadata()?;
        Ok(())
    }

    fn delete_node(&mut self, path: &str) -> Result<()> {
        self.remove_prefix(path)
    }

    /// Names of direct child arrays of the group at `path`.
    fn array_keys(&self, path: &str) -> Result<Vec<String>> {
        self.child_keys(path, NodeKind::Array)
    }

    /// Names of direct child groups of the group at `path`.
    fn group_keys(&self, path: &str) -> Result<Vec<String>> {
        self.child_keys(path, NodeKind::Group)
    }

    fn child_keys(&self, path: &str, kind: NodeKind) -> Result<Vec<String>> {
        let path = path.trim_matches('/');
        let skip = if path.is_empty() { 0 } else { path.len() + 1 };
        let mut names = Vec::new();
        for key in self.list_prefix(path)? {
            let Some((child, leaf)) = key[skip..].split_once('/') else {
                continue;
            };
            if leaf == NODE_METADATA_KEY && self.node_kind(&join_key(path, child))? == Some(kind) {
                names.push(child.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// User attributes of the group at `path`.
    fn attrs(&self, path: &str) -> Result<Map<String, Value>> {
        if !self.contains_group(path)? {
            return Ok(Map::new());
        }
        let group = Group::open(self.storage().clone(), &node_path(path))?;
        Ok(group.attributes().clone())
    }

    fn set_attr(&mut self, path: &str, key: &str, value: Value) -> Result<()> {
        self.ensure_writable()?;
        if !self.contains_group(path)? {
            self.create_group(path)?;
        }
        let mut group = Group::open(self.storage().clone(), &node_path(path))?;
        group.attributes_mut().insert(key.to_string(), value);
        group.store_metadata()?;
        Ok(())
    }

    /// Copy every key, byte for byte, into `dst`.
    fn copy_store(&self, dst: &mut dyn Store) -> Result<()> {
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                dst.set(&key, &value)?;
            }
        }
        Ok(())
    }
}

impl<S: Store + ?Sized> ArrayStoreExt for S {}
