//! Compiled artifact cache
//!
//! Keyed by expression text plus the cache keys of the optimizers applied.
//! Each key owns a mutex around its slot, so concurrent requests for the same
//! key wait for one build instead of racing their own. A failed build hands its
//! error to every requester already waiting on the slot, then the slot is
//! removed so a later request builds afresh.

use crate::compiler::CompiledExpression;
use crate::config::CacheConfig;
use crate::error::{FelError, FelResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Outcome of the build owned by one key
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Pending,
    Ready(Arc<CompiledExpression>),
    Failed(FelError),
}

type Entry = Arc<Mutex<Slot>>;

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub failures: u64,
    pub hit_rate: f64,
}

/// Thread-safe store of compiled artifacts
#[derive(Debug)]
pub struct ArtifactCache {
    entries: DashMap<String, Entry>,
    enabled: bool,
    capacity: usize,

    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl ArtifactCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            capacity: config.capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Return the artifact cached under `key`, building it with `build` if absent
    ///
    /// When the cache is disabled or full the artifact is built but not stored.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> FelResult<Arc<CompiledExpression>>
    where
        F: FnOnce() -> FelResult<CompiledExpression>,
    {
        let Some(entry) = self.entry(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Artifact cache bypassed");
            return self.run_build(key, build).map(Arc::new);
        };

        let mut slot = match entry.lock() {
            Ok(guard) => guard,
            // A panicking build leaves the slot pending; rebuild
            Err(poisoned) => poisoned.into_inner(),
        };
        match &*slot {
            Slot::Ready(artifact) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Artifact cache hit");
                return Ok(Arc::clone(artifact));
            }
            Slot::Failed(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Joined failed artifact build");
                return Err(err.clone());
            }
            Slot::Pending => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Artifact cache miss");
        match self.run_build(key, build) {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *slot = Slot::Ready(Arc::clone(&artifact));
                Ok(artifact)
            }
            Err(err) => {
                *slot = Slot::Failed(err.clone());
                drop(slot);
                self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
                Err(err)
            }
        }
    }

    /// Slot for `key`, `None` when the artifact must not be cached
    fn entry(&self, key: &str) -> Option<Entry> {
        if !self.enabled {
            return None;
        }
        if let Some(entry) = self.entries.get(key) {
            return Some(Arc::clone(entry.value()));
        }
        if self.entries.len() >= self.capacity {
            return None;
        }
        let entry = self.entries.entry(key.to_string()).or_default();
        Some(Arc::clone(entry.value()))
    }

    fn run_build<F>(&self, key: &str, build: F) -> FelResult<CompiledExpression>
    where
        F: FnOnce() -> FelResult<CompiledExpression>,
    {
        self.builds.fetch_add(1, Ordering::Relaxed);
        build().inspect_err(|err| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, category = err.category(), "Artifact build failed");
        })
    }

    /// Check if a built artifact is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        entry.try_lock().is_ok_and(|slot| matches!(*slot, Slot::Ready(_)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every artifact; statistics are kept
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            debug!(dropped, "Cleared artifact cache");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}
