//! volslice - slice caching and prefetching for volume viewers
//!
//! Interactive browsing of 2D slices cut from large out-of-core 3D volumes
//! (depth x height x width) along any of the three axes.
//!
//! # Features
//!
//! - Bounded LRU cache of slices keyed by (axis, index)
//! - Background prefetching of neighboring slices, nearest first
//! - Cooperative cancellation with generation-stamped results, so results
//!   from superseded requests are never delivered
//! - In-memory (`ndarray`) and raw on-disk volume sources
//! - Async API on top of tokio; reads run on the blocking pool
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use volslice::{Axis, Config, RawVolumeOpener, SliceNavigator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let opener = Arc::new(RawVolumeOpener::new("file:///data/seismic-volume")?);
//! let mut navigator = SliceNavigator::open(opener, Config::default()).await?;
//!
//! // Cache miss: read from disk, then neighbors 101, 99, 102, 98 are prefetched
//! let slice = navigator.navigate(Axis::Depth, 100).await?;
//! let pixels = slice.to_array::<f32>()?;
//!
//! // Most likely served from the cache
//! let next = navigator.navigate(Axis::Depth, 101).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod navigator;
pub mod prefetch;
pub mod raw;
pub mod slice;
pub mod source;
pub mod types;
pub mod utils;

// Re-exports
pub use cache::{CacheStats, SliceCache, DEFAULT_CACHE_CAPACITY};
pub use config::{CacheConfig, Config, PrefetchConfig};
pub use error::{Result, SliceError};
pub use navigator::SliceNavigator;
pub use prefetch::{
    interleaved_offsets, PrefetchCoordinator, PrefetchEvent, PrefetchEvents, PrefetchRequest,
    WorkerExit,
};
pub use raw::{RawVolume, RawVolumeOpener, VolumeHeader};
pub use slice::{SliceData, SliceKey};
pub use source::{ArrayVolume, ArrayVolumeOpener, SourceOpener, VolumeSource};
pub use types::{Axis, DataType, Sample, ValueRange, VolumeShape};

/// Version of the volslice crate
pub const VOLSLICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VOLSLICE_VERSION.is_empty());
    }
}
