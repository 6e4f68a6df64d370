//! Bounded LRU cache for volume slices.
//!
//! Slices are keyed by [`SliceKey`] (axis + index). Recency is tracked with a
//! hash index into a doubly-linked list of slots, so lookup, promotion,
//! insertion and eviction are all O(1).
//!
//! # Thread Safety
//!
//! Every operation takes `&self`; the state sits behind a single mutex so the
//! cache can be shared via `Arc` between a viewer and the task feeding it
//! prefetched slices.

use crate::slice::{SliceData, SliceKey};
use crate::types::Axis;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Default maximum number of cached slices
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size: usize,
    pub max_size: usize,
}

impl CacheStats {
    /// Number of `get` calls since the last clear
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// `hits / (hits + misses)`, or 0 when nothing was requested
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot {
    key: SliceKey,
    data: SliceData,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Hash index over an intrusive recency list. `head` is most recently used.
#[derive(Default)]
struct LruIndex {
    map: HashMap<SliceKey, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruIndex {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn contains(&self, key: &SliceKey) -> bool {
        self.map.contains_key(key)
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slot_mut(idx) {
            Some(slot) => (slot.prev.take(), slot.next.take()),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(slot) = self.slot_mut(p) {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slot_mut(n) {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = None;
            slot.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(slot) = self.slot_mut(h) {
                slot.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.detach(idx);
            self.push_front(idx);
        }
    }

    /// Look up a key and mark it most recently used
    fn get(&mut self, key: &SliceKey) -> Option<&SliceData> {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.slots
            .get(idx)
            .and_then(Option::as_ref)
            .map(|slot| &slot.data)
    }

    /// Replace the data of an existing key and promote it. Returns false if absent.
    fn update(&mut self, key: &SliceKey, data: SliceData) -> bool {
        let Some(&idx) = self.map.get(key) else {
            return false;
        };
        if let Some(slot) = self.slot_mut(idx) {
            slot.data = data;
        }
        self.promote(idx);
        true
    }

    /// Insert a key that is not present yet as most recently used
    fn insert_new(&mut self, key: SliceKey, data: SliceData) {
        let slot = Slot {
            key,
            data,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);
    }

    fn remove(&mut self, key: &SliceKey) -> Option<SliceData> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.free.push(idx);
        self.slots[idx].take().map(|slot| slot.data)
    }

    fn pop_lru(&mut self) -> Option<(SliceKey, SliceData)> {
        let key = self
            .tail
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
            .map(|slot| slot.key)?;
        self.remove(&key).map(|data| (key, data))
    }

    fn keys_by_recency(&self) -> Vec<SliceKey> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor.and_then(|idx| self.slots.get(idx)).and_then(Option::as_ref) {
            keys.push(slot.key);
            cursor = slot.next;
        }
        keys
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

struct CacheState {
    index: LruIndex,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU cache of decoded slices with a fixed entry capacity.
///
/// A capacity of 0 disables caching: every `put` is dropped and every `get`
/// misses.
///
/// # Example
///
/// ```
/// use volslice::{Axis, SliceCache, SliceData};
/// use ndarray::array;
///
/// let cache = SliceCache::new(2);
/// let slice = SliceData::from_array(array![[1u8, 2], [3, 4]].view());
///
/// cache.put(Axis::Depth, 1, &slice);
/// assert_eq!(cache.get(Axis::Depth, 1), Some(slice));
/// assert!(cache.get(Axis::Depth, 2).is_none());
/// assert_eq!(cache.stats().hit_rate(), 0.5);
/// ```
pub struct SliceCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl SliceCache {
    /// Create a cache holding at most `max_size` slices
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                index: LruIndex::default(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_size,
        }
    }

    /// Get a cached slice, marking it most recently used.
    ///
    /// Counts a hit or a miss.
    pub fn get(&self, axis: Axis, index: i64) -> Option<SliceData> {
        let key = SliceKey::new(axis, index);
        let mut state = self.state.lock();

        let found = state.index.get(&key).cloned();
        match found {
            Some(_) => state.hits += 1,
            None => state.misses += 1,
        }
        found
    }

    /// Insert or replace a slice.
    ///
    /// Replacing refreshes recency without changing the size. Inserting a new
    /// key into a full cache first evicts the least recently used entry.
    pub fn put(&self, axis: Axis, index: i64, data: &SliceData) {
        if self.max_size == 0 {
            return;
        }

        let key = SliceKey::new(axis, index);
        let mut state = self.state.lock();

        if state.index.update(&key, data.clone()) {
            return;
        }

        if state.index.len() >= self.max_size {
            if let Some((evicted, _)) = state.index.pop_lru() {
                state.evictions += 1;
                trace!(axis = evicted.axis.index(), index = evicted.index, "evicted slice");
            }
        }
        state.index.insert_new(key, data.clone());
    }

    /// Remove a slice if present
    pub fn remove(&self, axis: Axis, index: i64) {
        let key = SliceKey::new(axis, index);
        self.state.lock().index.remove(&key);
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.index.len();
        state.index.clear();
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
        debug!(dropped, "slice cache cleared");
    }

    /// Check for a key without touching recency or counters
    pub fn contains(&self, axis: Axis, index: i64) -> bool {
        self.state.lock().index.contains(&SliceKey::new(axis, index))
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            current_size: state.index.len(),
            max_size: self.max_size,
        }
    }

    /// Keys ordered from most to least recently used
    pub fn keys_by_recency(&self) -> Vec<SliceKey> {
        self.state.lock().index.keys_by_recency()
    }

    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for SliceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
