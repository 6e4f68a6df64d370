//! Background prefetching of neighboring slices.
//!
//! - [`offsets`]: the prefetch order and request type
//! - [`events`]: events published to the consumer, filtered by generation
//! - [`worker`]: the blocking task that reads and publishes slices
//! - [`coordinator`]: keeps at most one worker alive and revokes stale ones
//!
//! ```text
//! navigate(axis, i) ──► PrefetchCoordinator ──cancel──► old worker
//!                              │
//!                              └─spawn──► PrefetchWorker ──read──► VolumeSource
//!                                               │
//!                                    (generation, event)
//!                                               ▼
//!                                        PrefetchEvents ──► consumer / SliceCache
//! ```

pub mod coordinator;
pub mod events;
pub mod offsets;
pub mod worker;

pub use coordinator::PrefetchCoordinator;
pub use events::{PrefetchEvent, PrefetchEvents};
pub use offsets::{interleaved_offsets, PrefetchRequest};
pub use worker::{PrefetchWorker, WorkerExit};
