//! Bounded least-recently-used cache of computed segments.
//!
//! Keys are *unordered* endpoint pairs, so a segment computed from `a` to
//! `b` also answers a later `b` to `a` query; [`PathCache::get_oriented`]
//! reverses the stored coordinates when the direction differs.
//!
//! # Thread safety
//!
//! One `Mutex` guards the whole map. The interactive side reads and
//! invalidates while the background worker reads and writes. A poisoned
//! lock is recovered rather than propagated, since every critical section
//! leaves the map consistent.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::cost::CostFunction;
use crate::gradient::GradientField;
use crate::search::{SegmentSearch, find_path_with};
use crate::types::{GridCoord, PathSegment, ScissorsError};

/// Unordered pair of endpoints, stored with the smaller coordinate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    lo: GridCoord,
    hi: GridCoord,
}

impl PairKey {
    /// Normalize `{a, b}` so that `PairKey::new(a, b) == PairKey::new(b, a)`.
    #[must_use]
    pub fn new(a: GridCoord, b: GridCoord) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }
}

/// Cache counters, reported in session diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries currently held.
    pub len: usize,
    /// Maximum entries held.
    pub capacity: usize,
    /// Number of wholesale invalidations.
    pub invalidations: u64,
}

struct CacheInner {
    entries: LruCache<PairKey, PathSegment>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// Segment cache shared between the interactive side and the worker.
pub struct PathCache {
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for PathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("PathCache")
            .field("len", &stats.len)
            .field("capacity", &stats.capacity)
            .finish_non_exhaustive()
    }
}

impl PathCache {
    /// Create an empty cache holding at most `capacity` endpoint pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ScissorsError> {
        let cap = NonZeroUsize::new(capacity).ok_or_else(|| {
            ScissorsError::InvalidConfig("cache_capacity must be at least 1".to_string())
        })?;
        Ok(Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
                invalidations: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Segment stored for `{a, b}`, in the orientation it was stored.
    ///
    /// A hit refreshes the entry's recency.
    #[must_use]
    pub fn get(&self, a: GridCoord, b: GridCoord) -> Option<PathSegment> {
        let mut inner = self.lock();
        let found = inner.entries.get(&PairKey::new(a, b)).cloned();
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Segment for `{start, end}` walked from `start` to `end`.
    #[must_use]
    pub fn get_oriented(&self, start: GridCoord, end: GridCoord) -> Option<PathSegment> {
        let segment = self.get(start, end)?;
        if segment.first() == Some(start) {
            Some(segment)
        } else {
            Some(segment.reversed())
        }
    }

    /// Store `segment` for `{a, b}`, evicting the least recently used
    /// entry when full. Overwriting an existing pair refreshes it.
    pub fn put(&self, a: GridCoord, b: GridCoord, segment: PathSegment) {
        let mut inner = self.lock();
        if let Some((evicted, _)) = inner.entries.push(PairKey::new(a, b), segment)
            && evicted != PairKey::new(a, b)
        {
            tracing::trace!(lo = %evicted.lo, hi = %evicted.hi, "evicted cached segment");
        }
    }

    /// Returns `true` if `{a, b}` is cached, without touching recency.
    #[must_use]
    pub fn contains(&self, a: GridCoord, b: GridCoord) -> bool {
        self.lock().entries.contains(&PairKey::new(a, b))
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.invalidations += 1;
        tracing::debug!(dropped, "path cache invalidated");
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            invalidations: inner.invalidations,
        }
    }
}

/// Search that consults a [`PathCache`] first and stores what it computes.
#[derive(Debug, Clone, Copy)]
pub struct CachedSearch<'a, C: ?Sized> {
    field: &'a GradientField,
    cost: &'a C,
    cache: &'a PathCache,
}

impl<'a, C: CostFunction + ?Sized> CachedSearch<'a, C> {
    /// Search `field` under `cost`, memoizing through `cache`.
    ///
    /// The cache must have been created for `field` and `cost`.
    #[must_use]
    pub const fn new(field: &'a GradientField, cost: &'a C, cache: &'a PathCache) -> Self {
        Self { field, cost, cache }
    }
}

impl<C: CostFunction + ?Sized> SegmentSearch for CachedSearch<'_, C> {
    fn search(&self, start: GridCoord, end: GridCoord) -> Result<PathSegment, ScissorsError> {
        if let Some(segment) = self.cache.get_oriented(start, end) {
            tracing::debug!(%start, %end, "path cache hit");
            return Ok(segment);
        }
        tracing::debug!(%start, %end, "path cache miss");
        let result = find_path_with(self.field, self.cost, start, end)?;
        self.cache.put(start, end, result.path.clone());
        Ok(result.path)
    }
}
