//! Owned n-dimensional buffer exchanged with the array store.
//!
//! An `NdArray` is a dtype tag, a shape and a flat little-endian byte buffer in C order.
//! Row operations (slice, take, gather, extend) work on raw bytes so they are
//! dtype-agnostic; numeric conversions go through [`Element`].

use std::ops::Range;

use smallvec::SmallVec;

use super::dtype::{DType, Element, with_element_type};
use crate::error::{Result, TrxError};

pub type Shape = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdArray {
    dtype: DType,
    shape: Shape,
    data: Vec<u8>,
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn buffer_error(reason: String) -> TrxError {
    TrxError::ShapeMismatch {
        path: "<buffer>".to_string(),
        reason,
    }
}

impl NdArray {
    /// Wrap raw little-endian bytes. `shape` must have at least one dimension.
    pub fn new(dtype: DType, shape: &[usize], data: Vec<u8>) -> Result<Self> {
        if shape.is_empty() {
            return Err(buffer_error("scalar arrays are not supported".into()));
        }
        let expected = element_count(shape) * dtype.itemsize();
        if data.len() != expected {
            return Err(buffer_error(format!(
                "{} bytes for shape {shape:?} of {dtype}, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            dtype,
            shape: Shape::from_slice(shape),
            data,
        })
    }

    /// Zero rows with the given trailing dimensions.
    #[must_use]
    pub fn empty(dtype: DType, trailing: &[usize]) -> Self {
        let mut shape = Shape::new();
        shape.push(0);
        shape.extend_from_slice(trailing);
        Self {
            dtype,
            shape,
            data: Vec::new(),
        }
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Result<Self> {
        Self::new(dtype, shape, vec![0u8; element_count(shape) * dtype.itemsize()])
    }

    pub fn from_vec<T: Element>(values: Vec<T>, shape: &[usize]) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.itemsize());
        for value in values {
            value.write_le(&mut data);
        }
        Self::new(T::DTYPE, shape, data)
    }

    /// One-dimensional array of `values`.
    #[must_use]
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.itemsize());
        for value in values {
            value.write_le(&mut data);
        }
        Self {
            dtype: T::DTYPE,
            shape: smallvec::smallvec![values.len()],
            data,
        }
    }

    /// Two-dimensional array with one row per entry.
    #[must_use]
    pub fn from_rows<T: Element, const N: usize>(rows: &[[T; N]]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * N * T::DTYPE.itemsize());
        for row in rows {
            for value in row {
                value.write_le(&mut data);
            }
        }
        Self {
            dtype: T::DTYPE,
            shape: smallvec::smallvec![rows.len(), N],
            data,
        }
    }

    /// Encode `values` as `dtype`, rounding for integer targets.
    pub fn from_f64_as(dtype: DType, values: &[f64], shape: &[usize]) -> Result<Self> {
        let data = with_element_type!(dtype, T => {
            let mut data = Vec::with_capacity(values.len() * dtype.itemsize());
            for value in values {
                T::from_f64(*value).write_le(&mut data);
            }
            data
        });
        Self::new(dtype, shape, data)
    }

    /// Encode index values as `dtype`. Only integer targets are accepted.
    pub fn from_indices_as(dtype: DType, values: &[u64], shape: &[usize]) -> Result<Self> {
        if !dtype.is_integer() {
            return Err(TrxError::UnsupportedDType {
                dtype: dtype.to_string(),
            });
        }
        let data = with_element_type!(dtype, T => {
            let mut data = Vec::with_capacity(values.len() * dtype.itemsize());
            for value in values {
                T::from_index(*value).write_le(&mut data);
            }
            data
        });
        Self::new(dtype, shape, data)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Size of the first dimension.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    #[must_use]
    pub fn trailing_shape(&self) -> &[usize] {
        &self.shape[1..]
    }

    /// Elements in one row.
    #[must_use]
    pub fn row_len(&self) -> usize {
        element_count(self.trailing_shape())
    }

    #[must_use]
    pub fn row_nbytes(&self) -> usize {
        self.row_len() * self.dtype.itemsize()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn row_bytes(&self, row: usize) -> &[u8] {
        let width = self.row_nbytes();
        &self.data[row * width..(row + 1) * width]
    }

    /// Same dtype and trailing shape, so rows of one can be appended to the other.
    #[must_use]
    pub fn is_row_compatible(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.trailing_shape() == other.trailing_shape()
    }

    /// Reinterpret with a new shape covering the same number of elements.
    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        Self::new(self.dtype, shape, self.data)
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.dtype != T::DTYPE {
            return Err(buffer_error(format!(
                "cannot read {} as {}",
                self.dtype,
                T::DTYPE
            )));
        }
        let size = self.dtype.itemsize();
        Ok(self.data.chunks_exact(size).map(T::read_le).collect())
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let size = self.dtype.itemsize();
        with_element_type!(self.dtype, T => {
            Ok(self
                .data
                .chunks_exact(size)
                .map(|bytes| T::read_le(bytes).to_f64())
                .collect())
        })
    }

    /// Decode as streamline indices; fails on negative or non-integral values.
    pub fn to_index_vec(&self) -> Result<Vec<u64>> {
        let size = self.dtype.itemsize();
        with_element_type!(self.dtype, T => {
            self.data
                .chunks_exact(size)
                .map(|bytes| {
                    let value = T::read_le(bytes);
                    value.to_index().ok_or_else(|| {
                        buffer_error(format!("{} is not a valid index", value.to_f64()))
                    })
                })
                .collect()
        })
    }

    fn with_rows(&self, rows: usize, data: Vec<u8>) -> Self {
        let mut shape = self.shape.clone();
        shape[0] = rows;
        Self {
            dtype: self.dtype,
            shape,
            data,
        }
    }

    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.rows() {
            return Err(buffer_error(format!(
                "row range {range:?} outside {} rows",
                self.rows()
            )));
        }
        let width = self.row_nbytes();
        let data = self.data[range.start * width..range.end * width].to_vec();
        Ok(self.with_rows(range.len(), data))
    }

    /// Row-gather in the given order; repeated rows are repeated in the output.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Self> {
        let width = self.row_nbytes();
        let mut data = Vec::with_capacity(rows.len() * width);
        for &row in rows {
            if row >= self.rows() {
                return Err(buffer_error(format!(
                    "row {row} outside {} rows",
                    self.rows()
                )));
            }
            data.extend_from_slice(self.row_bytes(row));
        }
        Ok(self.with_rows(rows.len(), data))
    }

    /// Concatenate row blocks in iteration order.
    pub fn gather_ranges<I>(&self, ranges: I) -> Result<Self>
    where
        I: IntoIterator<Item = Range<usize>>,
    {
        let width = self.row_nbytes();
        let mut data = Vec::new();
        let mut rows = 0;
        for range in ranges {
            if range.start > range.end || range.end > self.rows() {
                return Err(buffer_error(format!(
                    "row range {range:?} outside {} rows",
                    self.rows()
                )));
            }
            data.extend_from_slice(&self.data[range.start * width..range.end * width]);
            rows += range.len();
        }
        Ok(self.with_rows(rows, data))
    }

    pub fn extend_rows(&mut self, other: &Self) -> Result<()> {
        if !self.is_row_compatible(other) {
            return Err(buffer_error(format!(
                "cannot append {} rows of {:?} to {} rows of {:?}",
                other.dtype,
                other.trailing_shape(),
                self.dtype,
                self.trailing_shape()
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.shape[0] += other.rows();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_inconsistent_buffers() {
        assert!(NdArray::new(DType::Float32, &[2, 3], vec![0u8; 24]).is_ok());
        assert!(NdArray::new(DType::Float32, &[2, 3], vec![0u8; 20]).is_err());
        assert!(NdArray::new(DType::UInt8, &[], Vec::new()).is_err());
    }

    #[test]
    fn take_rows_repeats_and_reorders() {
        let array = NdArray::from_rows(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let taken = array.take_rows(&[2, 0, 2]).unwrap();
        assert_eq!(taken.shape(), &[3, 2]);
        assert_eq!(
            taken.to_vec::<f32>().unwrap(),
            vec![5.0, 6.0, 1.0, 2.0, 5.0, 6.0]
        );
        assert!(array.take_rows(&[3]).is_err());
    }

    #[test]
    fn gather_ranges_concatenates_blocks() {
        let array = NdArray::from_slice(&[10u16, 11, 12, 13, 14]);
        let gathered = array.gather_ranges([3..5, 0..1, 3..5]).unwrap();
        assert_eq!(gathered.to_vec::<u16>().unwrap(), vec![13, 14, 10, 13, 14]);
    }

    #[test]
    fn extend_rows_checks_trailing_shape() {
        let mut left = NdArray::from_rows(&[[1u8, 2, 3]]);
        let right = NdArray::from_rows(&[[4u8, 5, 6], [7, 8, 9]]);
        left.extend_rows(&right).unwrap();
        assert_eq!(left.rows(), 3);

        let narrow = NdArray::from_rows(&[[1u8, 2]]);
        assert!(left.extend_rows(&narrow).is_err());
    }

    #[test]
    fn index_decoding_rejects_negative_values() {
        let ok = NdArray::from_slice(&[0i32, 5, 9]);
        assert_eq!(ok.to_index_vec().unwrap(), vec![0, 5, 9]);
        let bad = NdArray::from_slice(&[1i32, -2]);
        assert!(bad.to_index_vec().is_err());
    }

    #[test]
    fn float16_decodes_and_encodes() {
        let half = NdArray::new(DType::Float16, &[2], vec![0, 60, 0, 64]).unwrap();
        assert_eq!(half.to_f64_vec().unwrap(), vec![1.0, 2.0]);
        assert_eq!(half.take_rows(&[1]).unwrap().as_bytes(), &[0, 64]);
        let encoded = NdArray::from_f64_as(DType::Float16, &[1.0, 2.0], &[2]).unwrap();
        assert_eq!(encoded.as_bytes(), half.as_bytes());
    }

    #[test]
    fn numeric_casts_follow_target_dtype() {
        let array = NdArray::from_f64_as(DType::Int16, &[1.4, -2.6], &[2]).unwrap();
        assert_eq!(array.to_vec::<i16>().unwrap(), vec![1, -3]);
        let indices = NdArray::from_indices_as(DType::UInt32, &[3, 7], &[2]).unwrap();
        assert_eq!(indices.to_vec::<u32>().unwrap(), vec![3, 7]);
        assert!(NdArray::from_indices_as(DType::Float32, &[1], &[1]).is_err());
    }
}
