//! Core data types: axes, sample types and volume shapes

use crate::error::{Result, SliceError};
use crate::utils::format_bytes;
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample types a volume can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A primitive that can be stored as a volume sample.
///
/// Samples are stored little-endian regardless of the host.
pub trait Sample: Copy + Send + Sync + PartialOrd + NumCast + 'static {
    /// The matching [`DataType`] tag
    const DATA_TYPE: DataType;

    /// Decode one sample from exactly `size_in_bytes` little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this sample
    fn extend_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_sample {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const DATA_TYPE: DataType = DataType::$tag;

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                fn extend_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_sample!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// The volume dimension held fixed when cutting a slice.
///
/// Volumes are indexed `[depth][height][width]`, so a slice along
/// [`Axis::Depth`] is a `height x width` plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    /// Axis 0 (Z, XY plane)
    Depth = 0,
    /// Axis 1 (Y, XZ plane)
    Height = 1,
    /// Axis 2 (X, YZ plane)
    Width = 2,
}

impl Axis {
    /// All axes in index order
    pub const ALL: [Axis; 3] = [Axis::Depth, Axis::Height, Axis::Width];

    /// Convert from a raw axis number, failing fast on anything outside {0, 1, 2}
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Axis::Depth),
            1 => Ok(Axis::Height),
            2 => Ok(Axis::Width),
            other => Err(SliceError::InvalidAxis(other)),
        }
    }

    /// Convert to the raw axis number
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<usize> for Axis {
    type Error = SliceError;

    fn try_from(index: usize) -> Result<Self> {
        Axis::from_index(index)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Depth => "depth",
            Axis::Height => "height",
            Axis::Width => "width",
        };
        write!(f, "{} ({})", self.index(), name)
    }
}

/// Extents of a 3D volume along each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeShape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl VolumeShape {
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    /// Number of slices along `axis`
    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::Depth => self.depth,
            Axis::Height => self.height,
            Axis::Width => self.width,
        }
    }

    /// Extents as a `(depth, height, width)` tuple
    pub fn extents(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    /// `(rows, cols)` of a slice cut along `axis`
    pub fn slice_dims(&self, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::Depth => (self.height, self.width),
            Axis::Height => (self.depth, self.width),
            Axis::Width => (self.depth, self.height),
        }
    }

    /// Largest valid slice index along `axis`, or `None` when the axis is empty
    pub fn max_index(&self, axis: Axis) -> Option<usize> {
        self.extent(axis).checked_sub(1)
    }

    /// Check whether a (possibly negative) slice index is valid along `axis`
    pub fn contains_index(&self, axis: Axis, index: i64) -> bool {
        index >= 0 && (index as u64) < self.extent(axis) as u64
    }

    /// Total number of voxels, or `None` if it does not fit in `usize`
    pub fn voxel_count(&self) -> Option<usize> {
        self.depth
            .checked_mul(self.height)?
            .checked_mul(self.width)
    }

    /// Uncompressed size of the volume in bytes
    pub fn size_bytes(&self, data_type: DataType) -> Result<usize> {
        self.voxel_count()
            .and_then(|count| count.checked_mul(data_type.size_in_bytes()))
            .ok_or_else(|| {
                SliceError::InvalidDimensions(format!(
                    "{} volume of {} does not fit in memory",
                    self, data_type
                ))
            })
    }

    /// Get a summary string of the volume
    pub fn summary(&self, data_type: DataType) -> String {
        format!(
            "{} x {} x {} ({}), {} uncompressed",
            self.depth,
            self.height,
            self.width,
            data_type,
            self.size_bytes(data_type)
                .map(format_bytes)
                .unwrap_or_else(|_| "overflowing".to_string())
        )
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.height, self.width)
    }
}

/// Value range of a slice or volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Width of the range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}
