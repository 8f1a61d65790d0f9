//! Result cache – TTL + LRU memoization of loads with single-flight misses
//!
//! Entries are keyed by [`Fingerprint`]. An entry is readable only while
//! `now - created_at < ttl`; stale entries are dropped on the lookup that
//! finds them. When the cache is full the least recently used entry goes.
//!
//! A miss registers an in-flight slot for its fingerprint. Callers that miss
//! on the same fingerprint while the slot exists block on it and receive the
//! leader's result, success or error. Errors are never stored.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use lru::LruCache;
use parking_lot::{Condvar, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::data::model::{Fingerprint, Table};
use crate::error::LoadError;

/// A stored load result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Table,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    /// Computations actually started.
    pub computations: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    computations: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

// ---------------------------------------------------------------------------
// In-flight slot
// ---------------------------------------------------------------------------

type Outcome = Result<Table, LoadError>;

#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl Flight {
    fn complete(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// Releases the in-flight slot even if the computation unwinds, so waiters
/// are never stranded.
struct FlightGuard<'a> {
    cache: &'a ResultCache,
    fingerprint: &'a Fingerprint,
    flight: Arc<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.cache.inflight.lock().remove(self.fingerprint);
        // no-op when the leader already completed
        self.flight.complete(Err(LoadError::UpstreamReadFailure(
            "load computation panicked".into(),
        )));
    }
}

// ---------------------------------------------------------------------------
// ResultCache
// ---------------------------------------------------------------------------

pub struct ResultCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    inflight: Mutex<HashMap<Fingerprint, Arc<Flight>>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    counters: Counters,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` tables (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            clock,
            capacity: capacity.get(),
            counters: Counters::default(),
        }
    }

    /// Return the cached table for `fingerprint`, or run `compute` once to
    /// produce it, however many callers ask at the same time.
    pub fn get_or_compute<F>(
        &self,
        fingerprint: &Fingerprint,
        ttl: Duration,
        compute: F,
    ) -> Result<Table, LoadError>
    where
        F: FnOnce() -> Result<Table, LoadError>,
    {
        if let Some(table) = self.lookup(fingerprint) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit {fingerprint}");
            return Ok(table);
        }

        let (flight, leader) = {
            let mut inflight = self.inflight.lock();
            // the previous leader may have stored its result since our lookup
            if let Some(table) = self.lookup(fingerprint) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(table);
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            match inflight.get(fingerprint) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::default());
                    inflight.insert(fingerprint.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !leader {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!("cache miss {fingerprint}: waiting on in-flight load");
            return flight.wait();
        }

        debug!("cache miss {fingerprint}: computing");
        let guard = FlightGuard {
            cache: self,
            fingerprint,
            flight: Arc::clone(&flight),
        };
        self.counters.computations.fetch_add(1, Ordering::Relaxed);
        let outcome = compute();

        // store before the slot is released so late callers hit the cache
        if let Ok(table) = &outcome {
            self.store(fingerprint, table.clone(), ttl);
        }
        flight.complete(outcome.clone());
        drop(guard);
        outcome
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<Table> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = entries.get(fingerprint)?;
        if entry.is_valid(now) {
            return Some(entry.payload.clone());
        }
        entries.pop(fingerprint);
        self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        debug!("cache entry {fingerprint} expired");
        None
    }

    fn store(&self, fingerprint: &Fingerprint, payload: Table, ttl: Duration) {
        let entry = CacheEntry {
            payload,
            created_at: self.clock.now(),
            ttl,
        };
        let evicted = self.entries.lock().push(fingerprint.clone(), entry);
        if let Some((evicted_key, _)) = evicted {
            // push also returns the old value when replacing the same key
            if &evicted_key != fingerprint {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                warn!("cache full ({} entries); evicted {evicted_key}", self.capacity);
            }
        }
    }

    /// Drop every stored entry. In-flight computations are unaffected.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
        }
    }
}
