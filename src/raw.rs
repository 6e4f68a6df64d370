//! On-disk raw volumes.
//!
//! A raw volume is a directory holding two files:
//!
//! - `volume.json`: a [`VolumeHeader`] (format version, id, sample type, shape)
//! - `volume.raw`: every sample in C order (`[depth][height][width]`),
//!   little-endian, no padding
//!
//! Only local paths (bare or `file://`) are supported.

use crate::error::{Result, SliceError};
use crate::slice::SliceData;
use crate::source::{check_slice_index, SourceOpener, VolumeSource};
use crate::types::{Axis, DataType, Sample, VolumeShape};
use crate::utils::encode_samples;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ndarray::Array3;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Header file name inside a volume directory
pub const HEADER_FILE: &str = "volume.json";

/// Sample file name inside a volume directory
pub const SAMPLES_FILE: &str = "volume.raw";

/// Raw volume format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Contents of `volume.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeHeader {
    /// Format version
    pub version: FormatVersion,

    /// Identity of the dataset
    pub volume_id: Uuid,

    /// Sample type
    pub data_type: DataType,

    /// Extents along each axis
    pub shape: VolumeShape,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Custom metadata key-value pairs
    #[serde(default)]
    pub custom_metadata: HashMap<String, String>,
}

impl VolumeHeader {
    pub fn new(data_type: DataType, shape: VolumeShape) -> Self {
        Self {
            version: FormatVersion::default(),
            volume_id: Uuid::new_v4(),
            data_type,
            shape,
            created_at: Utc::now(),
            custom_metadata: HashMap::new(),
        }
    }

    /// Add custom metadata
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_metadata.insert(key.into(), value.into());
    }

    /// Get custom metadata
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.custom_metadata.get(key).map(|s| s.as_str())
    }

    /// Expected length of `volume.raw`
    pub fn samples_len(&self) -> Result<usize> {
        self.shape.size_bytes(self.data_type)
    }
}

/// Resolve a volume URL to its directory.
///
/// Bare paths and `file://` URLs are accepted; any other scheme is rejected.
pub fn volume_dir_from_url(url: &str) -> Result<PathBuf> {
    match url.find("://") {
        Some(scheme_end) => {
            let scheme = &url[..scheme_end];
            if scheme == "file" {
                Ok(PathBuf::from(&url[scheme_end + 3..]))
            } else {
                Err(SliceError::InvalidUrl(format!(
                    "Unsupported scheme '{}': only local raw volumes can be opened",
                    scheme
                )))
            }
        }
        None => Ok(PathBuf::from(url)),
    }
}

/// Write a header and its samples as a raw volume directory
pub async fn write_raw_volume(url: &str, header: &VolumeHeader, samples: &[u8]) -> Result<()> {
    let expected = header.samples_len()?;
    if samples.len() != expected {
        return Err(SliceError::InvalidDimensions(format!(
            "Data size mismatch: expected {} bytes, got {}",
            expected,
            samples.len()
        )));
    }

    let dir = volume_dir_from_url(url)?;
    fs::create_dir_all(&dir).await?;

    let header_json =
        serde_json::to_vec_pretty(header).map_err(|e| SliceError::Metadata(e.to_string()))?;
    fs::write(dir.join(HEADER_FILE), header_json).await?;

    let mut file = fs::File::create(dir.join(SAMPLES_FILE)).await?;
    file.write_all(samples).await?;
    file.flush().await?;

    debug!(path = %dir.display(), shape = %header.shape, "wrote raw volume");
    Ok(())
}

/// Write an in-memory array as a raw volume and return its header
pub async fn write_array_volume<T: Sample>(url: &str, data: &Array3<T>) -> Result<VolumeHeader> {
    let (depth, height, width) = data.dim();
    let header = VolumeHeader::new(T::DATA_TYPE, VolumeShape::new(depth, height, width));
    let samples = encode_samples(data.iter());
    write_raw_volume(url, &header, &samples).await?;
    Ok(header)
}

/// Read and validate `volume.json`
pub async fn read_header(dir: &Path) -> Result<VolumeHeader> {
    let bytes = fs::read(dir.join(HEADER_FILE)).await?;
    let header: VolumeHeader =
        serde_json::from_slice(&bytes).map_err(|e| SliceError::Metadata(e.to_string()))?;

    if !header.version.is_compatible(&FormatVersion::CURRENT) {
        return Err(SliceError::UnsupportedVersion {
            major: header.version.major,
            minor: header.version.minor,
        });
    }
    header.samples_len()?;
    Ok(header)
}

/// An open raw volume.
///
/// Reads go through one file handle serialized by a mutex. `close` detaches
/// the handle without waiting; a read already in progress keeps its own
/// reference and the file is released once it returns.
pub struct RawVolume {
    dir: PathBuf,
    header: VolumeHeader,
    file: RwLock<Option<Arc<Mutex<File>>>>,
}

impl RawVolume {
    /// Open the raw volume in `dir`, checking the sample file length
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let header = read_header(&dir).await?;

        let samples_path = dir.join(SAMPLES_FILE);
        let expected = header.samples_len()?;
        let actual = fs::metadata(&samples_path).await?.len();
        if actual != expected as u64 {
            return Err(SliceError::InvalidFormat(format!(
                "{} holds {} bytes, header expects {}",
                samples_path.display(),
                actual,
                expected
            )));
        }

        let file = fs::File::open(&samples_path).await?.into_std().await;
        debug!(
            path = %dir.display(),
            summary = %header.shape.summary(header.data_type),
            "opened raw volume"
        );

        Ok(Self {
            dir,
            header,
            file: RwLock::new(Some(Arc::new(Mutex::new(file)))),
        })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    fn handle(&self) -> Result<Arc<Mutex<File>>> {
        self.file
            .read()
            .clone()
            .ok_or_else(|| SliceError::SourceRead(format!("{} is closed", self.dir.display())))
    }

    fn read_samples(&self, file: &mut File, axis: Axis, index: usize) -> std::io::Result<Vec<u8>> {
        let shape = self.header.shape;
        let sample = self.header.data_type.size_in_bytes();
        let (rows, cols) = shape.slice_dims(axis);
        let row_bytes = shape.width * sample;
        let plane_bytes = shape.height * row_bytes;
        let mut out = vec![0u8; rows * cols * sample];
        if out.is_empty() {
            return Ok(out);
        }

        match axis {
            Axis::Depth => {
                file.seek(SeekFrom::Start((index * plane_bytes) as u64))?;
                file.read_exact(&mut out)?;
            }
            Axis::Height => {
                for (d, row) in out.chunks_exact_mut(row_bytes).enumerate() {
                    let offset = d * plane_bytes + index * row_bytes;
                    file.seek(SeekFrom::Start(offset as u64))?;
                    file.read_exact(row)?;
                }
            }
            Axis::Width => {
                // Samples are strided by a full row, so read plane by plane
                // and pick the column out of each.
                let mut plane = vec![0u8; plane_bytes];
                for (d, dst) in out.chunks_exact_mut(shape.height * sample).enumerate() {
                    file.seek(SeekFrom::Start((d * plane_bytes) as u64))?;
                    file.read_exact(&mut plane)?;
                    for (h, cell) in dst.chunks_exact_mut(sample).enumerate() {
                        let src = h * row_bytes + index * sample;
                        cell.copy_from_slice(&plane[src..src + sample]);
                    }
                }
            }
        }

        Ok(out)
    }
}

impl VolumeSource for RawVolume {
    fn shape(&self) -> VolumeShape {
        self.header.shape
    }

    fn data_type(&self) -> DataType {
        self.header.data_type
    }

    fn read_slice(&self, axis: Axis, index: usize) -> Result<SliceData> {
        check_slice_index(&self.header.shape, axis, index)?;
        let handle = self.handle()?;

        let samples = {
            let mut file = handle.lock();
            self.read_samples(&mut file, axis, index).map_err(|e| {
                SliceError::SourceRead(format!(
                    "{} axis {} slice {}: {}",
                    self.dir.display(),
                    axis.index(),
                    index,
                    e
                ))
            })?
        };

        let (rows, cols) = self.header.shape.slice_dims(axis);
        SliceData::from_bytes(self.header.data_type, rows, cols, samples)
    }

    fn close(&self) {
        if self.file.write().take().is_some() {
            debug!(path = %self.dir.display(), "closed raw volume");
        }
    }
}

/// Opens [`RawVolume`] handles on one volume directory
#[derive(Debug, Clone)]
pub struct RawVolumeOpener {
    dir: PathBuf,
}

impl RawVolumeOpener {
    /// Create an opener from a bare path or `file://` URL
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            dir: volume_dir_from_url(url)?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SourceOpener for RawVolumeOpener {
    async fn open(&self) -> Result<Box<dyn VolumeSource>> {
        Ok(Box::new(RawVolume::open(&self.dir).await?))
    }

    fn describe(&self) -> String {
        format!("raw volume at {}", self.dir.display())
    }
}
