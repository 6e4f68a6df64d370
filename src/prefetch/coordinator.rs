//! Serializes prefetch requests so only one worker reads at a time.
//!
//! Every `start_prefetching` call cancels the live worker, waits a bounded
//! time for it, closes its handle and launches a replacement tagged with a
//! new generation. Stopping also advances the generation, so nothing a
//! revoked worker publishes afterwards is delivered.

use super::events::{self, EventSender, PrefetchEvent, PrefetchEvents, StampedEvent};
use super::offsets::PrefetchRequest;
use super::worker::{PrefetchWorker, WorkerExit, WorkerSource};
use crate::config::PrefetchConfig;
use crate::source::SourceOpener;
use crate::types::Axis;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct LiveWorker {
    generation: u64,
    cancel: Arc<AtomicBool>,
    source: Arc<WorkerSource>,
    join: JoinHandle<WorkerExit>,
}

/// Owns at most one live [`PrefetchWorker`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ndarray::Array3;
/// use volslice::{ArrayVolumeOpener, Axis, PrefetchConfig, PrefetchCoordinator, PrefetchEvent};
///
/// #[tokio::main]
/// async fn main() {
///     let opener = Arc::new(ArrayVolumeOpener::new(Array3::<u8>::zeros((16, 8, 8))));
///     let (mut coordinator, mut events) =
///         PrefetchCoordinator::new(opener, &PrefetchConfig::default());
///
///     coordinator.start_prefetching(Axis::Depth, 4, 1).await;
///
///     // Nearest neighbors arrive first: 5, then 3
///     if let Some(PrefetchEvent::SliceReady { index, .. }) = events.recv().await {
///         assert_eq!(index, 5);
///     }
///
///     coordinator.cleanup().await;
/// }
/// ```
pub struct PrefetchCoordinator {
    opener: Arc<dyn SourceOpener>,
    generation: Arc<AtomicU64>,
    events: EventSender,
    live: Option<LiveWorker>,
    stop_timeout: Duration,
    position: Option<(Axis, usize)>,
}

impl PrefetchCoordinator {
    /// Create a coordinator and the receiver its events are delivered to
    pub fn new(opener: Arc<dyn SourceOpener>, config: &PrefetchConfig) -> (Self, PrefetchEvents) {
        let generation = Arc::new(AtomicU64::new(0));
        let (events, receiver) = events::channel(Arc::clone(&generation));

        let coordinator = Self {
            opener,
            generation,
            events,
            live: None,
            stop_timeout: config.stop_timeout(),
            position: None,
        };
        (coordinator, receiver)
    }

    /// Replace the live worker with one prefetching `prefetch_range` neighbors
    /// on each side of `current_index`, nearest first.
    ///
    /// Returns the generation of the new worker. Failures to open the source
    /// are reported as [`PrefetchEvent::PrefetchFailed`], never returned.
    pub async fn start_prefetching(
        &mut self,
        axis: Axis,
        current_index: usize,
        prefetch_range: usize,
    ) -> u64 {
        self.stop_prefetching().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.position = Some((axis, current_index));
        let request = PrefetchRequest::around(axis, current_index, prefetch_range);

        let source = match self.opener.open().await {
            Ok(source) => Arc::new(WorkerSource::new(source)),
            Err(err) => {
                let message = format!("Failed to open {}: {}", self.opener.describe(), err);
                warn!(generation, %message, "prefetch source unavailable");
                let _ = self.events.send(StampedEvent {
                    generation,
                    event: PrefetchEvent::PrefetchFailed { message },
                });
                return generation;
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = PrefetchWorker::new(
            generation,
            request,
            Arc::clone(&source),
            Arc::clone(&cancel),
            self.events.clone(),
        );
        let join = tokio::task::spawn_blocking(move || worker.run());

        debug!(
            generation,
            axis = axis.index(),
            index = current_index,
            range = prefetch_range,
            "started prefetch worker"
        );
        self.live = Some(LiveWorker {
            generation,
            cancel,
            source,
            join,
        });
        generation
    }

    /// Cancel the live worker and wait up to the stop timeout for it.
    ///
    /// The worker's results are revoked immediately and its source handle is
    /// closed whether or not it stopped in time.
    pub async fn stop_prefetching(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };

        live.cancel.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::SeqCst);

        match tokio::time::timeout(self.stop_timeout, live.join).await {
            Ok(Ok(exit)) => debug!(generation = live.generation, ?exit, "prefetch worker stopped"),
            Ok(Err(err)) => warn!(generation = live.generation, %err, "prefetch worker panicked"),
            Err(_) => warn!(
                generation = live.generation,
                timeout_ms = self.stop_timeout.as_millis() as u64,
                "prefetch worker did not stop in time, abandoning it"
            ),
        }

        live.source.close();
    }

    /// Stop prefetching for good
    pub async fn cleanup(&mut self) {
        self.stop_prefetching().await;
        self.position = None;
    }

    /// Generation whose events are currently delivered
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a worker is still running
    pub fn is_prefetching(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| !live.join.is_finished())
    }

    /// Axis and index of the last prefetch request
    pub fn current_position(&self) -> Option<(Axis, usize)> {
        self.position
    }
}

impl Drop for PrefetchCoordinator {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.cancel.store(true, Ordering::Release);
            self.generation.fetch_add(1, Ordering::SeqCst);
            live.source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SliceError};
    use crate::source::{ArrayVolumeOpener, VolumeSource};
    use async_trait::async_trait;
    use ndarray::Array3;

    fn opener(depth: usize) -> Arc<dyn SourceOpener> {
        let data = Array3::from_shape_fn((depth, 3, 3), |(d, _, _)| d as u8);
        Arc::new(ArrayVolumeOpener::new(data))
    }

    fn config() -> PrefetchConfig {
        PrefetchConfig {
            range: 2,
            stop_timeout_ms: 1000,
        }
    }

    async fn collect_ready(events: &mut PrefetchEvents, count: usize) -> Vec<usize> {
        let mut indices = Vec::new();
        while indices.len() < count {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Some(PrefetchEvent::SliceReady { index, .. })) => indices.push(index),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        indices
    }

    #[tokio::test]
    async fn test_prefetch_order() {
        let (mut coordinator, mut events) = PrefetchCoordinator::new(opener(20), &config());

        coordinator.start_prefetching(Axis::Depth, 5, 3).await;
        assert_eq!(coordinator.current_position(), Some((Axis::Depth, 5)));

        let indices = collect_ready(&mut events, 6).await;
        assert_eq!(indices, vec![6, 4, 7, 3, 8, 2]);

        coordinator.cleanup().await;
        assert!(!coordinator.is_prefetching());
        assert_eq!(coordinator.current_position(), None);
    }

    #[tokio::test]
    async fn test_edges_are_filtered() {
        let (mut coordinator, mut events) = PrefetchCoordinator::new(opener(4), &config());

        coordinator.start_prefetching(Axis::Depth, 3, 3).await;
        let indices = collect_ready(&mut events, 3).await;
        assert_eq!(indices, vec![2, 1, 0]);

        coordinator.stop_prefetching().await;
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_generation_advances() {
        let (mut coordinator, _events) = PrefetchCoordinator::new(opener(8), &config());

        let first = coordinator.start_prefetching(Axis::Depth, 1, 1).await;
        let second = coordinator.start_prefetching(Axis::Depth, 2, 1).await;
        assert!(second > first);
        assert_eq!(coordinator.current_generation(), second);

        coordinator.stop_prefetching().await;
        assert!(coordinator.current_generation() > second);
    }

    #[tokio::test]
    async fn test_discard_revoked_slices() {
        let (mut coordinator, mut events) = PrefetchCoordinator::new(opener(20), &config());

        coordinator.start_prefetching(Axis::Depth, 5, 2).await;
        for _ in 0..500 {
            if !coordinator.is_prefetching() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!coordinator.is_prefetching());

        // Four unread slices of the first request are still queued
        coordinator.start_prefetching(Axis::Depth, 15, 1).await;
        assert_eq!(events.discard_stale(), 4);

        assert_eq!(collect_ready(&mut events, 2).await, vec![16, 14]);
        coordinator.cleanup().await;
    }

    struct BrokenOpener;

    #[async_trait]
    impl SourceOpener for BrokenOpener {
        async fn open(&self) -> Result<Box<dyn VolumeSource>> {
            Err(SliceError::SourceRead("no such dataset".to_string()))
        }

        fn describe(&self) -> String {
            "broken dataset".to_string()
        }
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let (mut coordinator, mut events) =
            PrefetchCoordinator::new(Arc::new(BrokenOpener), &config());

        coordinator.start_prefetching(Axis::Width, 0, 2).await;
        assert!(!coordinator.is_prefetching());

        match events.try_recv() {
            Some(PrefetchEvent::PrefetchFailed { message }) => {
                assert!(message.contains("broken dataset"));
                assert!(message.contains("no such dataset"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_worker_is_noop() {
        let (mut coordinator, _events) = PrefetchCoordinator::new(opener(8), &config());
        coordinator.stop_prefetching().await;
        coordinator.cleanup().await;
        assert_eq!(coordinator.current_generation(), 0);
    }
}
