//! Ragged partition bookkeeping shared by `positions` and every per-point array.
//!
//! A ragged sequence is one flat row arena plus a non-decreasing offsets index; row `i`
//! spans `[offsets[i], offsets[i + 1])`, the last row ending at the total row count.

use std::ops::Range;

use crate::error::{Result, TrxError};
use crate::types::NdArray;

/// Per-row lengths from an offsets sequence and the arena size.
pub fn compute_lengths(offsets: &[u64], nb_points: u64) -> Result<Vec<u64>> {
    let mut lengths = Vec::with_capacity(offsets.len());
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(nb_points);
        if end < start || end > nb_points {
            return Err(TrxError::InvalidMetadata {
                key: crate::constants::OFFSETS.to_string(),
                reason: format!(
                    "offset {i} spans {start}..{end} outside {nb_points} points"
                ),
            });
        }
        lengths.push(end - start);
    }
    Ok(lengths)
}

/// Offsets and lengths for one ragged partition, built fresh from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetIndex {
    offsets: Vec<u64>,
    lengths: Vec<u64>,
    nb_points: u64,
}

impl OffsetIndex {
    pub fn new(offsets: Vec<u64>, nb_points: u64) -> Result<Self> {
        let lengths = compute_lengths(&offsets, nb_points)?;
        Ok(Self {
            offsets,
            lengths,
            nb_points,
        })
    }

    /// Cumulative sum of `lengths`, starting at zero.
    #[must_use]
    pub fn from_lengths(lengths: Vec<u64>) -> Self {
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut cursor = 0u64;
        for length in &lengths {
            offsets.push(cursor);
            cursor += length;
        }
        Self {
            offsets,
            lengths,
            nb_points: cursor,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    #[must_use]
    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    #[must_use]
    pub fn nb_points(&self) -> u64 {
        self.nb_points
    }

    /// Row range of streamline `i` in the flat arena.
    #[allow(clippy::cast_possible_truncation)]
    pub fn range(&self, i: usize) -> Result<Range<usize>> {
        let (Some(&start), Some(&length)) = (self.offsets.get(i), self.lengths.get(i)) else {
            return Err(TrxError::IndexOutOfRange {
                index: i as u64,
                count: self.len() as u64,
            });
        };
        Ok(start as usize..(start + length) as usize)
    }

    /// Ranges of `indices` in the given order, with their lengths.
    pub fn ranges_for(&self, indices: &[usize]) -> Result<(Vec<Range<usize>>, Vec<u64>)> {
        let mut ranges = Vec::with_capacity(indices.len());
        let mut lengths = Vec::with_capacity(indices.len());
        for &index in indices {
            let range = self.range(index)?;
            lengths.push(range.len() as u64);
            ranges.push(range);
        }
        Ok((ranges, lengths))
    }

    /// Shift every offset by `base` points.
    #[must_use]
    pub fn shifted(&self, base: u64) -> Vec<u64> {
        self.offsets.iter().map(|offset| offset + base).collect()
    }
}

/// Read-only ragged view over a flat array.
#[derive(Debug, Clone, PartialEq)]
pub struct RaggedArray {
    data: NdArray,
    index: OffsetIndex,
}

impl RaggedArray {
    pub fn new(data: NdArray, index: OffsetIndex) -> Result<Self> {
        if data.rows() as u64 != index.nb_points() {
            return Err(TrxError::ShapeMismatch {
                path: "<ragged>".to_string(),
                reason: format!(
                    "{} rows for an index over {} points",
                    data.rows(),
                    index.nb_points()
                ),
            });
        }
        Ok(Self { data, index })
    }

    #[must_use]
    pub fn data(&self) -> &NdArray {
        &self.data
    }

    #[must_use]
    pub fn index(&self) -> &OffsetIndex {
        &self.index
    }

    #[must_use]
    pub fn into_parts(self) -> (NdArray, OffsetIndex) {
        (self.data, self.index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rows of element `i`.
    pub fn get(&self, i: usize) -> Result<NdArray> {
        self.data.slice_rows(self.index.range(i)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<NdArray>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}
