//! Events published by prefetch workers.
//!
//! Workers stamp every event with their generation. [`PrefetchEvents`]
//! compares that stamp with the coordinator's current generation at the
//! moment the event is handed out, so results of a cancelled or superseded
//! worker never reach the consumer, however late they arrive.

use crate::slice::SliceData;
use crate::types::Axis;
use futures::Stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Notification delivered to the consumer of a prefetch coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchEvent {
    /// A neighboring slice was read and is ready to be cached or rendered
    SliceReady {
        axis: Axis,
        index: usize,
        data: SliceData,
    },
    /// The worker could not read from its source and stopped
    PrefetchFailed { message: String },
}

#[derive(Debug)]
pub(crate) struct StampedEvent {
    pub(crate) generation: u64,
    pub(crate) event: PrefetchEvent,
}

pub(crate) type EventSender = mpsc::UnboundedSender<StampedEvent>;

pub(crate) fn channel(current: Arc<AtomicU64>) -> (EventSender, PrefetchEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        PrefetchEvents {
            rx,
            current,
            pending: VecDeque::new(),
        },
    )
}

/// Receiving end of a coordinator's events.
///
/// The queue is unbounded and stale events are only dropped when they are
/// received, so slices of revoked workers stay in memory until the receiver
/// is polled. Consumers that do not poll between navigation steps should
/// call [`PrefetchEvents::discard_stale`] after restarting prefetching.
pub struct PrefetchEvents {
    rx: mpsc::UnboundedReceiver<StampedEvent>,
    current: Arc<AtomicU64>,
    pending: VecDeque<StampedEvent>,
}

impl PrefetchEvents {
    fn accept(&self, stamped: StampedEvent) -> Option<PrefetchEvent> {
        let current = self.current.load(Ordering::SeqCst);
        if stamped.generation == current {
            Some(stamped.event)
        } else {
            trace!(
                generation = stamped.generation,
                current,
                "dropped stale prefetch event"
            );
            None
        }
    }

    fn next_pending(&mut self) -> Option<PrefetchEvent> {
        while let Some(stamped) = self.pending.pop_front() {
            if let Some(event) = self.accept(stamped) {
                return Some(event);
            }
        }
        None
    }

    /// Wait for the next current-generation event.
    ///
    /// Returns `None` once the coordinator and all of its workers are gone.
    pub async fn recv(&mut self) -> Option<PrefetchEvent> {
        if let Some(event) = self.next_pending() {
            return Some(event);
        }
        loop {
            let stamped = self.rx.recv().await?;
            if let Some(event) = self.accept(stamped) {
                return Some(event);
            }
        }
    }

    /// Take the next current-generation event if one is already queued
    pub fn try_recv(&mut self) -> Option<PrefetchEvent> {
        if let Some(event) = self.next_pending() {
            return Some(event);
        }
        while let Ok(stamped) = self.rx.try_recv() {
            if let Some(event) = self.accept(stamped) {
                return Some(event);
            }
        }
        None
    }

    /// Drop every queued event of a revoked generation, keeping current ones
    /// in order. Returns the number of events dropped.
    pub fn discard_stale(&mut self) -> usize {
        let current = self.current.load(Ordering::SeqCst);
        while let Ok(stamped) = self.rx.try_recv() {
            self.pending.push_back(stamped);
        }

        let before = self.pending.len();
        self.pending.retain(|stamped| stamped.generation == current);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            trace!(dropped, current, "discarded stale prefetch events");
        }
        dropped
    }

    /// Consume the receiver as a stream of current-generation events
    pub fn into_stream(self) -> impl Stream<Item = PrefetchEvent> {
        futures::stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}
