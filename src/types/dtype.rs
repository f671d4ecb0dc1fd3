//! Element types understood by the array store.

use std::fmt;

use half::f16;
use serde::{Deserialize, Serialize};
use zarrs::array::{DataType, ElementOwned, FillValue};

use crate::error::{Result, TrxError};

/// Element type of a stored array. Encoded little-endian on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    /// IEEE half precision, decoded through [`half::f16`].
    Float16,
    Float32,
    Float64,
}

impl DType {
    #[must_use]
    pub fn itemsize(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Matching `zarrs` data type.
    #[must_use]
    pub fn to_zarrs(self) -> DataType {
        match self {
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Float16 => DataType::Float16,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
        }
    }

    /// Map a stored array's data type back; anything non-numeric is refused.
    pub fn from_zarrs(data_type: &DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Int8 => Self::Int8,
            DataType::Int16 => Self::Int16,
            DataType::Int32 => Self::Int32,
            DataType::Int64 => Self::Int64,
            DataType::UInt8 => Self::UInt8,
            DataType::UInt16 => Self::UInt16,
            DataType::UInt32 => Self::UInt32,
            DataType::UInt64 => Self::UInt64,
            DataType::Float16 => Self::Float16,
            DataType::Float32 => Self::Float32,
            DataType::Float64 => Self::Float64,
            other => {
                return Err(TrxError::UnsupportedDType {
                    dtype: format!("{other:?}"),
                });
            }
        })
    }

    /// All-zero fill value, which reads back as `0` for every dtype.
    #[must_use]
    pub fn fill_value(self) -> FillValue {
        FillValue::new(vec![0; self.itemsize()])
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rust scalar with a fixed `DType` and a little-endian encoding. The `zarrs` bound lets
/// array chunks be read and written as typed elements.
pub trait Element: ElementOwned + Copy + Send + Sync + 'static {
    const DTYPE: DType;

    /// Decode from the first `DTYPE.itemsize()` bytes of `bytes`.
    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, out: &mut Vec<u8>);

    fn to_f64(self) -> f64;

    /// `None` for negative or non-integral values.
    fn to_index(self) -> Option<u64>;

    fn from_f64(value: f64) -> Self;

    fn from_index(value: u64) -> Self;
}

macro_rules! impl_int_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            #[allow(clippy::unnecessary_cast, clippy::cast_possible_truncation)]
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(buf)
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_index(self) -> Option<u64> {
                    u64::try_from(self).ok()
                }

                fn from_f64(value: f64) -> Self {
                    value.round() as $ty
                }

                fn from_index(value: u64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            #[allow(clippy::unnecessary_cast, clippy::cast_possible_truncation, clippy::float_cmp)]
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(buf)
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn to_index(self) -> Option<u64> {
                    if self >= 0.0 && self.fract() == 0.0 && (self as f64) <= u64::MAX as f64 {
                        Some(self as u64)
                    } else {
                        None
                    }
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                fn from_index(value: u64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_int_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
);

impl_float_element!(f32 => Float32, f64 => Float64);

#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
impl Element for f16 {
    const DTYPE: DType = DType::Float16;

    fn read_le(bytes: &[u8]) -> Self {
        f16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn to_index(self) -> Option<u64> {
        let value = f64::from(self);
        if value >= 0.0 && value.fract() == 0.0 && value.is_finite() {
            Some(value as u64)
        } else {
            None
        }
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn from_index(value: u64) -> Self {
        f16::from_f64(value as f64)
    }
}

/// Run `$body` with `$t` bound to the Rust type of `$dtype`.
macro_rules! with_element_type {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::types::DType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::types::DType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::types::DType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::types::DType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::types::DType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::types::DType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::types::DType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::types::DType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::types::DType::Float16 => {
                type $t = ::half::f16;
                $body
            }
            $crate::types::DType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::types::DType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use with_element_type;
