//! The background task that reads neighboring slices.
//!
//! A worker walks its offsets in the order given, reads each in-range target
//! from its own source handle and publishes the result. It checks the
//! cancellation flag before every read; a read already in progress cannot be
//! interrupted, so cancellation latency is at most one read.

use super::events::{EventSender, PrefetchEvent, StampedEvent};
use super::offsets::PrefetchRequest;
use crate::error::Result;
use crate::slice::SliceData;
use crate::source::VolumeSource;
use crate::types::{Axis, VolumeShape};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// A worker's source handle whose `close` runs exactly once, whoever calls it
pub(crate) struct WorkerSource {
    inner: Box<dyn VolumeSource>,
    closed: AtomicBool,
}

impl WorkerSource {
    pub(crate) fn new(inner: Box<dyn VolumeSource>) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn shape(&self) -> VolumeShape {
        self.inner.shape()
    }

    pub(crate) fn read_slice(&self, axis: Axis, index: usize) -> Result<SliceData> {
        self.inner.read_slice(axis, index)
    }

    /// Close the underlying handle. Returns true for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.close();
        true
    }
}

/// How a worker terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every offset was processed
    Completed { published: usize },
    /// The cancellation flag was observed
    Cancelled { published: usize },
    /// A read failed and a failure event was published
    Failed { published: usize },
    /// The event receiver is gone
    Disconnected { published: usize },
}

/// Reads the slices of one [`PrefetchRequest`] and publishes them
pub struct PrefetchWorker {
    generation: u64,
    request: PrefetchRequest,
    source: Arc<WorkerSource>,
    cancel: Arc<AtomicBool>,
    events: EventSender,
}

impl PrefetchWorker {
    pub(crate) fn new(
        generation: u64,
        request: PrefetchRequest,
        source: Arc<WorkerSource>,
        cancel: Arc<AtomicBool>,
        events: EventSender,
    ) -> Self {
        Self {
            generation,
            request,
            source,
            cancel,
            events,
        }
    }

    /// Run to completion on the calling thread, then close the source handle
    pub fn run(self) -> WorkerExit {
        let _span = debug_span!(
            "prefetch_worker",
            generation = self.generation,
            axis = self.request.axis.index(),
            reference = self.request.reference_index
        )
        .entered();

        let exit = self.prefetch();
        self.source.close();
        debug!(?exit, "prefetch worker finished");
        exit
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn publish(&self, event: PrefetchEvent) -> bool {
        self.events
            .send(StampedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    fn prefetch(&self) -> WorkerExit {
        let axis = self.request.axis;
        let shape = self.source.shape();
        let mut published = 0;

        for &offset in &self.request.offsets {
            if self.is_cancelled() {
                return WorkerExit::Cancelled { published };
            }
            let Some(target) = self.request.target(offset, &shape) else {
                continue;
            };

            match self.source.read_slice(axis, target) {
                Ok(data) => {
                    // Cancelled while the read was in flight
                    if self.is_cancelled() {
                        return WorkerExit::Cancelled { published };
                    }
                    let event = PrefetchEvent::SliceReady {
                        axis,
                        index: target,
                        data,
                    };
                    if !self.publish(event) {
                        return WorkerExit::Disconnected { published };
                    }
                    published += 1;
                    trace!(index = target, "prefetched slice");
                }
                Err(err) => {
                    if self.is_cancelled() {
                        return WorkerExit::Cancelled { published };
                    }
                    let message = format!(
                        "Prefetch error on axis {} slice {}: {}",
                        axis.index(),
                        target,
                        err
                    );
                    debug!(%message, "prefetch read failed");
                    if !self.publish(PrefetchEvent::PrefetchFailed { message }) {
                        return WorkerExit::Disconnected { published };
                    }
                    return WorkerExit::Failed { published };
                }
            }
        }

        WorkerExit::Completed { published }
    }
}
