//! TTL-based key/value cache with optional disk persistence
//!
//! Entries live in memory; when persistence is enabled each write is
//! mirrored to `<dir>/<sanitized-key>.json` and disk is consulted on an
//! in-memory miss. Disk faults are logged and swallowed so the cache
//! degrades to memory-only behavior instead of failing the caller.

use crate::utils::errors::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache policy, fixed at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Default time-to-live for entries
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of in-memory entries
    pub max_size: usize,
    /// Mirror writes to disk and consult it on misses
    pub persist_to_disk: bool,
    /// Directory for persisted entries
    pub cache_directory: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 100,
            persist_to_disk: false,
            cache_directory: None,
        }
    }
}

impl CacheOptions {
    /// Disk-backed options rooted at the platform cache directory.
    pub fn persistent(name: &str) -> Self {
        Self {
            persist_to_disk: true,
            cache_directory: default_cache_dir(name),
            ..Default::default()
        }
    }
}

/// Platform cache directory for a named cache, e.g.
/// `~/.cache/resource-relay/<name>` on Linux.
pub fn default_cache_dir(name: &str) -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("resource-relay").join(name))
}

/// A single cached value. Immutable once created; `set` replaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub ttl: Duration,
    pub version: u32,
}

impl CacheEntry {
    /// Valid iff `now - timestamp < ttl`.
    pub fn is_valid(&self) -> bool {
        match Utc::now().signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age < self.ttl,
            // Timestamp in the future (clock adjustment); treat as fresh.
            Err(_) => true,
        }
    }
}

/// Per-write overrides for `set` / `get_or_fetch`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub version: Option<u32>,
}

/// Keyed store of time-limited entries with oldest-write eviction.
pub struct Cache {
    name: String,
    entries: DashMap<String, CacheEntry>,
    options: CacheOptions,
}

impl Cache {
    pub fn new(name: impl Into<String>, options: CacheOptions) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key, falling back to disk when persistence is enabled.
    /// Expired entries are evicted from memory and disk and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_valid() {
                return Some(entry.data.clone());
            }
            drop(entry);
            self.entries.remove(key);
            self.remove_from_disk(key).await;
            return None;
        }

        if self.options.persist_to_disk {
            if let Some(entry) = self.load_from_disk(key).await {
                if entry.is_valid() {
                    // Write-back on read so later lookups stay in memory.
                    self.entries.insert(key.to_string(), entry.clone());
                    return Some(entry.data);
                }
                self.remove_from_disk(key).await;
            }
        }

        None
    }

    /// Insert a value, evicting the oldest-written entry when full.
    pub async fn set(&self, key: &str, value: Value, opts: SetOptions) {
        let entry = CacheEntry {
            data: value,
            timestamp: Utc::now(),
            ttl: opts.ttl.unwrap_or(self.options.ttl),
            version: opts.version.unwrap_or(1),
        };

        if !self.entries.contains_key(key) && self.entries.len() >= self.options.max_size {
            self.evict_oldest().await;
        }

        if self.options.persist_to_disk {
            self.persist_entry(key, &entry).await;
        }
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove a key from memory and disk. Absent keys are not an error.
    pub async fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        self.remove_from_disk(key).await;
    }

    /// Remove every in-memory key matching `pattern`, from memory and disk.
    /// Persisted entries that are not currently loaded into memory are not
    /// scanned.
    pub async fn invalidate_pattern(&self, pattern: &str) -> RelayResult<usize> {
        let regex =
            Regex::new(pattern).map_err(|e| RelayError::InvalidPattern(e.to_string()))?;

        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| regex.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
            self.remove_from_disk(&key).await;
        }
        debug!(cache = %self.name, pattern, removed, "invalidated by pattern");
        Ok(removed)
    }

    /// Empty the cache and delete every persisted file.
    pub async fn clear(&self) {
        self.entries.clear();

        let Some(dir) = self.persist_dir() else { return };
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => {
                warn!(cache = %self.name, error = %e, "failed to list cache directory");
                return;
            }
        };
        while let Ok(Some(dirent)) = read_dir.next_entry().await {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(cache = %self.name, path = %path.display(), error = %e, "failed to delete cache file");
                }
            }
        }
    }

    /// Evict every expired in-memory entry. Intended for periodic
    /// housekeeping rather than on every access.
    pub fn cleanup(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_valid())
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(cache = %self.name, removed, "cleaned up expired entries");
        }
        removed
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Concurrent misses for the same key are NOT deduplicated: both callers
    /// invoke `compute`. Providers behind this cache are expected to be
    /// idempotent.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        compute: F,
        opts: SetOptions,
    ) -> RelayResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<Value>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), opts).await;
        Ok(value)
    }

    async fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.timestamp)
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            debug!(cache = %self.name, key = %key, "evicting oldest entry");
            self.entries.remove(&key);
            self.remove_from_disk(&key).await;
        }
    }

    /// Map a key onto a filesystem-safe name. Every character outside
    /// `[A-Za-z0-9_-]` becomes `_`, so keys differing only by punctuation
    /// collide on disk. Accepted approximation, not a uniqueness guarantee.
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn persist_dir(&self) -> Option<&PathBuf> {
        if !self.options.persist_to_disk {
            return None;
        }
        self.options.cache_directory.as_ref()
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.persist_dir()
            .map(|dir| dir.join(format!("{}.json", Self::sanitize_key(key))))
    }

    async fn load_from_disk(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(cache = %self.name, key, error = %e, "failed to read cache file");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache = %self.name, key, error = %e, "discarding corrupt cache file");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn persist_entry(&self, key: &str, entry: &CacheEntry) {
        let Some(path) = self.entry_path(key) else { return };

        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(cache = %self.name, error = %e, "failed to create cache directory");
                return;
            }
        }

        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(cache = %self.name, key, error = %e, "failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&path, raw).await {
            warn!(cache = %self.name, key, error = %e, "failed to write cache file");
        }
    }

    async fn remove_from_disk(&self, key: &str) {
        let Some(path) = self.entry_path(key) else { return };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(cache = %self.name, key, error = %e, "failed to delete cache file");
            }
        }
    }
}
