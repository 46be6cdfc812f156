//! Result cache for deterministic operations.
//!
//! Entries are keyed by a SHA-256 digest of the operation name and a
//! canonical serialization of the parameters (object keys sorted), so
//! `{"a": 1, "b": 2}` and `{"b": 2, "a": 1}` share an entry.
//!
//! Two concurrent misses on the same key both run the operation and both
//! write the same value; the later write wins. Deduplicating in-flight
//! misses is not attempted.

use crate::operation::OperationSpec;
use crate::orchestrator::CallResult;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long an entry stays valid after it was written.
    pub ttl: Duration,
    /// Maximum number of entries before the oldest one is evicted.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: JsonValue,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl: Duration,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe TTL cache with bounded size.
#[derive(Debug)]
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Computes the cache key for an operation invocation.
    pub fn cache_key(operation: &str, params: &JsonValue) -> String {
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Returns the cached payload if present and not expired.
    ///
    /// Expired entries are removed on access.
    pub fn get(&self, operation: &str, params: &JsonValue) -> Option<JsonValue> {
        let key = Self::cache_key(operation, params);
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(&key) {
            Some(entry) if entry.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(operation, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(&key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(operation, "Cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a call result.
    ///
    /// Nothing is stored unless the operation is `cacheable` and the result
    /// is a success with a payload. Returns whether an entry was written.
    pub fn set(&self, operation: &OperationSpec, params: &JsonValue, result: &CallResult) -> bool {
        if !operation.cacheable || !result.success {
            return false;
        }
        let Some(payload) = &result.payload else {
            return false;
        };
        self.insert(&operation.name, params, payload.clone());
        true
    }

    /// Writes an entry unconditionally, evicting the oldest one at capacity.
    pub fn insert(&self, operation: &str, params: &JsonValue, value: JsonValue) {
        let key = Self::cache_key(operation, params);
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            self.evict_oldest(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl: self.config.ttl,
            },
        );
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Evicted oldest cache entry");
        }
    }

    /// Removes the entry for one invocation. Returns whether it existed.
    pub fn invalidate(&self, operation: &str, params: &JsonValue) -> bool {
        let key = Self::cache_key(operation, params);
        self.lock().remove(&key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before - entries.len();
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Removes all entries. Counters are kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.config.max_entries,
            ttl: self.config.ttl,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// Serializes a JSON value with object keys in sorted order.
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
