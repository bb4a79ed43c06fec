//! Named cache instances with isolated policies

use crate::cache::store::{Cache, CacheOptions};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Creates and hands out one `Cache` per name so independent subsystems get
/// isolated TTL/size policies without duplicating cache logic.
///
/// Construct one registry and inject it wherever caching is needed; there is
/// deliberately no process-wide instance.
pub struct CacheRegistry {
    caches: DashMap<String, Arc<Cache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
        }
    }

    /// Get or create the cache for `name`. Options apply only on first
    /// creation; later calls with different options are ignored.
    pub fn get_cache(&self, name: &str, options: CacheOptions) -> Arc<Cache> {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = name, "creating cache");
                Arc::new(Cache::new(name, options))
            })
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.iter().map(|e| e.key().clone()).collect()
    }

    /// Run expiry housekeeping across every registered cache.
    pub fn cleanup_all(&self) -> usize {
        self.caches.iter().map(|e| e.cleanup()).sum()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
