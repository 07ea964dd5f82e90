//! Bounded memo of analysis results with least-recently-used eviction.
//!
//! Owned by an [`AnalysisClient`](super::AnalysisClient); capacity is
//! injected at construction. Every lookup or insert stamps the entry with a
//! monotonically increasing tick, and a full cache evicts the entry with the
//! oldest stamp.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::analysis::Analysis;
use crate::model::EducationLevel;

/// Default number of memoized analyses.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Memo key: the exact input text and its framing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    level: EducationLevel,
}

impl CacheKey {
    pub fn new(text: &str, level: EducationLevel) -> Self {
        Self {
            text: text.to_string(),
            level,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    value: Analysis,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    tick: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// LRU memo of `(text, level) -> Analysis`.
pub struct AnalysisCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl AnalysisCache {
    /// A cache holding at most `capacity` entries. Zero disables memoization.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a memoized result, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Analysis> {
        let mut inner = self.lock();
        let tick = inner.next_tick();
        let hit = inner.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        });
        if hit.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        hit
    }

    /// Memoize a result, evicting the least recently used entry if full.
    pub fn insert(&self, key: CacheKey, value: Analysis) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        let tick = inner.next_tick();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
                tracing::trace!("analysis cache evicted least recently used entry");
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                last_used: tick,
            },
        );
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
