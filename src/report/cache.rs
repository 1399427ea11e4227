// Single-flight report cache
//
// Keyed by (event id, options hash). The first caller for a key builds the
// report; concurrent callers for the same key block on the same slot and
// receive the same `Arc`. Failed builds are evicted so a later call retries.
// At most `capacity` slots are kept: the least recently used finished report
// is dropped to make room. In-flight builds are never evicted, so the bound
// can be exceeded by the number of concurrent distinct requests.

use super::ComprehensiveImpactReport;
use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

pub type CacheKey = (String, u64);

type Slot = Arc<OnceLock<Result<Arc<ComprehensiveImpactReport>>>>;

#[derive(Debug, Default)]
struct Slots {
    map: HashMap<CacheKey, Slot>,
    /// Keys from least to most recently used; mirrors `map`
    recency: VecDeque<CacheKey>,
}

impl Slots {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        self.map.remove(key);
        self.recency.retain(|k| k != key);
    }

    /// Drop least recently used finished slots until one more fits
    fn make_room(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.map.len() >= capacity {
            let finished = self
                .recency
                .iter()
                .position(|k| self.map.get(k).is_some_and(|slot| slot.get().is_some()));
            let Some(pos) = finished else { break };
            if let Some(key) = self.recency.remove(pos) {
                self.map.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    fn slot(&mut self, key: &CacheKey, capacity: usize) -> Slot {
        if let Some(slot) = self.map.get(key) {
            let slot = Arc::clone(slot);
            self.touch(key);
            return slot;
        }
        let evicted = self.make_room(capacity);
        if evicted > 0 {
            tracing::debug!(evicted, capacity, "report cache full, evicted oldest reports");
        }
        let slot = Slot::default();
        self.map.insert(key.clone(), Arc::clone(&slot));
        self.recency.push_back(key.clone());
        slot
    }
}

#[derive(Debug)]
pub struct ReportCache {
    slots: Mutex<Slots>,
    capacity: usize,
    builds: AtomicUsize,
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` finished reports (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            capacity: capacity.max(1),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panicking builder never holds this lock, so the map stays consistent
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached report for `key`, building it at most once
    pub fn get_or_build<F>(&self, key: CacheKey, build: F) -> Result<Arc<ComprehensiveImpactReport>>
    where
        F: FnOnce() -> Result<ComprehensiveImpactReport>,
    {
        let slot = self.lock().slot(&key, self.capacity);

        let mut built_here = false;
        let outcome = slot
            .get_or_init(|| {
                built_here = true;
                self.builds.fetch_add(1, Ordering::SeqCst);
                build().map(Arc::new)
            })
            .clone();

        if !built_here {
            tracing::debug!(event = %key.0, hash = key.1, "report cache hit");
        }

        if outcome.is_err() {
            let mut slots = self.lock();
            if slots.map.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                slots.remove(&key);
            }
        }
        outcome
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock()
            .map
            .get(key)
            .is_some_and(|slot| matches!(slot.get(), Some(Ok(_))))
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of builds started since creation
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Drop every cached report; later requests rebuild
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.map.clear();
        slots.recency.clear();
    }
}
