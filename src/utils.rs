//! Utility functions

use crate::error::{Result, SliceError};
use crate::types::Sample;

/// Decode little-endian bytes into typed samples
pub fn decode_samples<T: Sample>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::DATA_TYPE.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(SliceError::InvalidFormat(format!(
            "Byte length {} not aligned with {} samples",
            bytes.len(),
            T::DATA_TYPE
        )));
    }

    Ok(bytes.chunks_exact(size).map(T::from_le_slice).collect())
}

/// Encode typed samples as little-endian bytes
pub fn encode_samples<'a, T: Sample>(samples: impl IntoIterator<Item = &'a T>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for sample in samples {
        sample.extend_le(&mut bytes);
    }
    bytes
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_codec() {
        let data: Vec<f32> = vec![1.0, -2.0, 3.5, 4.0];
        let bytes = encode_samples(&data);
        assert_eq!(bytes.len(), data.len() * 4);

        let recovered: Vec<f32> = decode_samples(&bytes).unwrap();
        assert_eq!(data, recovered);
    }

    #[test]
    fn test_decode_misaligned() {
        let result = decode_samples::<u16>(&[1, 2, 3]);
        assert!(matches!(result, Err(SliceError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }
}
