//! Cache-first slice navigation.
//!
//! [`SliceNavigator`] ties the pieces together for an interactive viewer:
//! each navigation step is answered from the [`SliceCache`] when possible,
//! falls back to a blocking read otherwise, and restarts prefetching around
//! the new position. Prefetched slices are folded into the cache whenever the
//! navigator is driven.

use crate::cache::SliceCache;
use crate::config::Config;
use crate::error::{Result, SliceError};
use crate::prefetch::{PrefetchCoordinator, PrefetchEvent, PrefetchEvents};
use crate::slice::SliceData;
use crate::source::{SourceOpener, VolumeSource};
use crate::types::{Axis, DataType, VolumeShape};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Browses the slices of one dataset at a time
pub struct SliceNavigator {
    source: Arc<dyn VolumeSource>,
    cache: Arc<SliceCache>,
    coordinator: PrefetchCoordinator,
    events: PrefetchEvents,
    config: Config,
}

impl SliceNavigator {
    /// Open `opener`'s dataset with the given settings
    pub async fn open(opener: Arc<dyn SourceOpener>, config: Config) -> Result<Self> {
        config.validate()?;
        let source: Arc<dyn VolumeSource> = Arc::from(opener.open().await?);
        let cache = Arc::new(SliceCache::new(config.cache.capacity));
        let (coordinator, events) =
            PrefetchCoordinator::new(Arc::clone(&opener), &config.prefetch);

        info!(
            dataset = %opener.describe(),
            summary = %source.shape().summary(source.data_type()),
            "opened dataset"
        );

        Ok(Self {
            source,
            cache,
            coordinator,
            events,
            config,
        })
    }

    pub fn shape(&self) -> VolumeShape {
        self.source.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.source.data_type()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The cache shared with prefetch delivery
    pub fn cache(&self) -> &Arc<SliceCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &PrefetchCoordinator {
        &self.coordinator
    }

    /// Move to slice `index` along `axis` and return it.
    ///
    /// Prefetching restarts around the new position.
    pub async fn navigate(&mut self, axis: Axis, index: usize) -> Result<SliceData> {
        self.absorb_prefetched();

        let extent = self.shape().extent(axis);
        if index >= extent {
            return Err(SliceError::OutOfBounds(format!(
                "slice {} on axis {} (extent {})",
                index, axis, extent
            )));
        }

        let key = index as i64;
        let data = match self.cache.get(axis, key) {
            Some(data) => data,
            None => {
                let source = Arc::clone(&self.source);
                let data =
                    tokio::task::spawn_blocking(move || source.read_slice(axis, index)).await??;
                self.cache.put(axis, key, &data);
                debug!(axis = axis.index(), index, "read slice from source");
                data
            }
        };

        self.coordinator
            .start_prefetching(axis, index, self.config.prefetch.range)
            .await;
        Ok(data)
    }

    /// Apply every prefetch event already delivered, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn absorb_prefetched(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_recv() {
            self.apply(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next prefetch event, apply it and hand it back.
    ///
    /// Returns `None` once no worker can publish anymore.
    pub async fn next_event(&mut self) -> Option<PrefetchEvent> {
        let event = self.events.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    fn apply(&self, event: PrefetchEvent) {
        match event {
            PrefetchEvent::SliceReady { axis, index, data } => {
                self.cache.put(axis, index as i64, &data);
            }
            PrefetchEvent::PrefetchFailed { message } => {
                warn!(%message, "prefetch failed");
            }
        }
    }

    /// Switch to another dataset.
    ///
    /// Prefetching stops, the cache is emptied and its counters reset. On
    /// failure to open the new dataset the navigator keeps the old one.
    pub async fn load_dataset(&mut self, opener: Arc<dyn SourceOpener>) -> Result<()> {
        self.coordinator.cleanup().await;

        let source: Arc<dyn VolumeSource> = Arc::from(opener.open().await?);
        let previous = std::mem::replace(&mut self.source, source);
        previous.close();

        self.cache.clear();
        let (coordinator, events) =
            PrefetchCoordinator::new(Arc::clone(&opener), &self.config.prefetch);
        self.coordinator = coordinator;
        self.events = events;

        info!(
            dataset = %opener.describe(),
            summary = %self.shape().summary(self.data_type()),
            "loaded dataset"
        );
        Ok(())
    }

    /// Stop prefetching and release the dataset
    pub async fn close(mut self) {
        self.coordinator.cleanup().await;
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ArrayVolumeOpener;
    use ndarray::Array3;
    use std::time::Duration;

    fn volume(depth: usize, fill: u8) -> Arc<dyn SourceOpener> {
        let data = Array3::from_shape_fn((depth, 4, 3), |(d, h, w)| {
            fill.wrapping_add((d * 100 + h * 10 + w) as u8)
        });
        Arc::new(ArrayVolumeOpener::new(data))
    }

    async fn wait_for_ready(navigator: &mut SliceNavigator, count: usize) {
        for _ in 0..count {
            let event = tokio::time::timeout(Duration::from_secs(5), navigator.next_event())
                .await
                .unwrap();
            assert!(matches!(event, Some(PrefetchEvent::SliceReady { .. })));
        }
    }

    #[tokio::test]
    async fn test_navigate_reads_then_hits() {
        let mut navigator = SliceNavigator::open(volume(10, 0), Config::default())
            .await
            .unwrap();
        assert_eq!(navigator.shape(), VolumeShape::new(10, 4, 3));
        assert_eq!(navigator.data_type(), DataType::U8);

        let first = navigator.navigate(Axis::Height, 2).await.unwrap();
        assert_eq!(first.dims(), (10, 3));
        assert_eq!(first.to_array::<u8>().unwrap()[[1, 2]], 122);
        assert_eq!(navigator.cache().stats().misses, 1);

        let again = navigator.navigate(Axis::Height, 2).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(navigator.cache().stats().hits, 1);

        navigator.close().await;
    }

    #[tokio::test]
    async fn test_prefetched_slices_are_cached() {
        let mut navigator = SliceNavigator::open(volume(10, 0), Config::default())
            .await
            .unwrap();

        navigator.navigate(Axis::Depth, 5).await.unwrap();
        assert_eq!(
            navigator.coordinator().current_position(),
            Some((Axis::Depth, 5))
        );

        // Range 2 around 5: 6, 4, 7, 3
        wait_for_ready(&mut navigator, 4).await;
        for index in [3, 4, 6, 7] {
            assert!(navigator.cache().contains(Axis::Depth, index));
        }

        let before = navigator.cache().stats().hits;
        navigator.navigate(Axis::Depth, 6).await.unwrap();
        assert_eq!(navigator.cache().stats().hits, before + 1);

        navigator.close().await;
    }

    #[tokio::test]
    async fn test_out_of_bounds() {
        let mut navigator = SliceNavigator::open(volume(4, 0), Config::default())
            .await
            .unwrap();

        let err = navigator.navigate(Axis::Depth, 4).await.unwrap_err();
        assert!(matches!(err, SliceError::OutOfBounds(_)));
        assert!(navigator.navigate(Axis::Width, 2).await.is_ok());
        assert!(navigator.navigate(Axis::Width, 3).await.is_err());

        navigator.close().await;
    }

    #[tokio::test]
    async fn test_load_dataset_resets_cache() {
        let mut navigator = SliceNavigator::open(volume(6, 0), Config::default())
            .await
            .unwrap();
        navigator.navigate(Axis::Depth, 1).await.unwrap();
        assert!(!navigator.cache().is_empty());

        navigator.load_dataset(volume(8, 50)).await.unwrap();
        assert_eq!(navigator.shape().depth, 8);
        assert!(navigator.cache().is_empty());
        assert_eq!(navigator.cache().stats().total_requests(), 0);
        assert!(navigator.coordinator().current_position().is_none());

        // 50 + (700 mod 256)
        let slice = navigator.navigate(Axis::Depth, 7).await.unwrap();
        assert_eq!(slice.to_array::<u8>().unwrap()[[0, 0]], 238);

        navigator.close().await;
    }

    #[tokio::test]
    async fn test_disabled_cache_still_navigates() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        config.prefetch.range = 0;
        let mut navigator = SliceNavigator::open(volume(3, 0), config).await.unwrap();

        navigator.navigate(Axis::Depth, 0).await.unwrap();
        navigator.navigate(Axis::Depth, 0).await.unwrap();
        assert_eq!(navigator.cache().stats().misses, 2);
        assert!(navigator.cache().is_empty());
        assert_eq!(navigator.absorb_prefetched(), 0);

        navigator.close().await;
    }
}
