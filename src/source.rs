//! Volume sources: the capability of reading a 2D slice out of a 3D volume.
//!
//! A [`VolumeSource`] is one open handle on a dataset. Handles are created by
//! a [`SourceOpener`], which lets the prefetch coordinator hand every
//! background worker a handle of its own while the viewer keeps another one
//! for synchronous reads.

use crate::error::{Result, SliceError};
use crate::slice::SliceData;
use crate::types::{Axis, DataType, Sample, VolumeShape};
use async_trait::async_trait;
use ndarray::Array3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An open handle on a 3D volume
pub trait VolumeSource: Send + Sync {
    /// Extents of the volume
    fn shape(&self) -> VolumeShape;

    /// Sample type of the volume
    fn data_type(&self) -> DataType;

    /// Read the slice at `index` along `axis`. Blocks until the data is available.
    ///
    /// Fails with [`SliceError::SourceRead`] if the index is out of range or
    /// the handle is no longer usable.
    fn read_slice(&self, axis: Axis, index: usize) -> Result<SliceData>;

    /// Release the handle. Calling it more than once is harmless.
    fn close(&self);
}

/// Opens fresh [`VolumeSource`] handles on one dataset
#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Open a new handle
    async fn open(&self) -> Result<Box<dyn VolumeSource>>;

    /// Human-readable dataset description for logs
    fn describe(&self) -> String;
}

/// Reject indices outside the volume with a source read error
pub(crate) fn check_slice_index(shape: &VolumeShape, axis: Axis, index: usize) -> Result<()> {
    let extent = shape.extent(axis);
    if index >= extent {
        return Err(SliceError::SourceRead(format!(
            "slice {} out of range for axis {} with extent {}",
            index, axis, extent
        )));
    }
    Ok(())
}

/// In-memory volume backed by an `ndarray` array shared between handles
pub struct ArrayVolume<T: Sample> {
    data: Arc<Array3<T>>,
    closed: AtomicBool,
}

impl<T: Sample> ArrayVolume<T> {
    pub fn new(data: Arc<Array3<T>>) -> Self {
        Self {
            data,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T: Sample> VolumeSource for ArrayVolume<T> {
    fn shape(&self) -> VolumeShape {
        let (depth, height, width) = self.data.dim();
        VolumeShape::new(depth, height, width)
    }

    fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    fn read_slice(&self, axis: Axis, index: usize) -> Result<SliceData> {
        if self.is_closed() {
            return Err(SliceError::SourceRead("volume handle is closed".to_string()));
        }
        check_slice_index(&self.shape(), axis, index)?;

        let plane = self.data.index_axis(ndarray::Axis(axis.index()), index);
        Ok(SliceData::from_array(plane))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Opens [`ArrayVolume`] handles over the same in-memory array
pub struct ArrayVolumeOpener<T: Sample> {
    data: Arc<Array3<T>>,
}

impl<T: Sample> ArrayVolumeOpener<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn shared(data: Arc<Array3<T>>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl<T: Sample> SourceOpener for ArrayVolumeOpener<T> {
    async fn open(&self) -> Result<Box<dyn VolumeSource>> {
        Ok(Box::new(ArrayVolume::new(Arc::clone(&self.data))))
    }

    fn describe(&self) -> String {
        let (depth, height, width) = self.data.dim();
        format!("in-memory {}x{}x{} {}", depth, height, width, T::DATA_TYPE)
    }
}
