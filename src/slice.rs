//! Slice keys and immutable 2D slice buffers

use crate::error::{Result, SliceError};
use crate::types::{Axis, DataType, Sample, ValueRange};
use crate::utils::{decode_samples, encode_samples};
use bytes::Bytes;
use ndarray::{Array2, ArrayView2};
use num_traits::ToPrimitive;
use std::fmt;

/// Identifies a slice: the axis held fixed and the offset along it.
///
/// The index is signed and opaque to the cache; whether it is inside the
/// volume is the caller's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SliceKey {
    pub axis: Axis,
    pub index: i64,
}

impl SliceKey {
    pub fn new(axis: Axis, index: i64) -> Self {
        Self { axis, index }
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "axis {} slice {}", self.axis.index(), self.index)
    }
}

/// An immutable row-major `height x width` grid of samples.
///
/// The sample buffer is reference counted and never mutated, so clones are
/// cheap and no holder can change what another holder sees. Use
/// [`SliceData::to_array`] to get an owned copy that can be modified.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceData {
    data_type: DataType,
    height: usize,
    width: usize,
    samples: Bytes,
}

impl SliceData {
    /// Wrap raw little-endian samples, validating the buffer length
    pub fn from_bytes(
        data_type: DataType,
        height: usize,
        width: usize,
        samples: impl Into<Bytes>,
    ) -> Result<Self> {
        let samples = samples.into();
        let expected = height
            .checked_mul(width)
            .and_then(|count| count.checked_mul(data_type.size_in_bytes()))
            .ok_or_else(|| {
                SliceError::InvalidDimensions(format!(
                    "{}x{} {} slice does not fit in memory",
                    height, width, data_type
                ))
            })?;
        if samples.len() != expected {
            return Err(SliceError::InvalidDimensions(format!(
                "{}x{} {} slice needs {} bytes, got {}",
                height,
                width,
                data_type,
                expected,
                samples.len()
            )));
        }

        Ok(Self {
            data_type,
            height,
            width,
            samples,
        })
    }

    /// Copy a 2D array view into a new slice
    pub fn from_array<T: Sample>(array: ArrayView2<'_, T>) -> Self {
        let (height, width) = array.dim();
        Self {
            data_type: T::DATA_TYPE,
            height,
            width,
            samples: Bytes::from(encode_samples(array.iter())),
        }
    }

    /// Decode into an owned array the caller is free to modify
    pub fn to_array<T: Sample>(&self) -> Result<Array2<T>> {
        if T::DATA_TYPE != self.data_type {
            return Err(SliceError::DataTypeMismatch {
                expected: T::DATA_TYPE,
                actual: self.data_type,
            });
        }

        let values = decode_samples::<T>(&self.samples)?;
        Array2::from_shape_vec((self.height, self.width), values)
            .map_err(|e| SliceError::InvalidDimensions(e.to_string()))
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// `(height, width)`
    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Raw little-endian samples
    pub fn as_bytes(&self) -> &[u8] {
        &self.samples
    }

    /// Size of the sample buffer in bytes
    pub fn len_bytes(&self) -> usize {
        self.samples.len()
    }

    /// Min/max over all non-NaN samples, `None` for an empty slice
    pub fn value_range(&self) -> Option<ValueRange> {
        match self.data_type {
            DataType::U8 => self.range_of::<u8>(),
            DataType::U16 => self.range_of::<u16>(),
            DataType::U32 => self.range_of::<u32>(),
            DataType::U64 => self.range_of::<u64>(),
            DataType::I8 => self.range_of::<i8>(),
            DataType::I16 => self.range_of::<i16>(),
            DataType::I32 => self.range_of::<i32>(),
            DataType::I64 => self.range_of::<i64>(),
            DataType::F32 => self.range_of::<f32>(),
            DataType::F64 => self.range_of::<f64>(),
        }
    }

    fn range_of<T: Sample>(&self) -> Option<ValueRange> {
        let mut range: Option<ValueRange> = None;

        for chunk in self.samples.chunks_exact(T::DATA_TYPE.size_in_bytes()) {
            let value = match T::from_le_slice(chunk).to_f64() {
                Some(v) if !v.is_nan() => v,
                _ => continue,
            };
            range = Some(match range {
                None => ValueRange::new(value, value),
                Some(r) => ValueRange::new(r.min.min(value), r.max.max(value)),
            });
        }

        range
    }
}
