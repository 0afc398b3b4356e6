use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::content::ServiceResult;
use crate::utils::now_millis;

pub mod store;

pub use store::{CacheStore, FileStore, MemoryStore};

/// Schema version stamped on every entry
pub const CURRENT_VERSION: &str = "1.0";

/// Default lifetime of an entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// A cached result with its key, creation time (ms since epoch) and schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub key: String,
    pub timestamp: i64,
    pub version: String,
    pub data: ServiceResult,
}

impl CacheEntry {
    pub fn is_valid(&self, now: i64, ttl: Duration, version: &str) -> bool {
        let age = now.saturating_sub(self.timestamp);
        age < ttl.as_millis() as i64 && self.version == version
    }
}

/// Fingerprint-keyed cache of processing results with expiry and version
/// invalidation. Invalid entries are evicted when read.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    version: String,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
            version: CURRENT_VERSION.to_string(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Look up a valid entry, evicting it if it expired or is from another version
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.store.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry = match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Discarding unreadable cache entry {}: {}", key, e);
                self.evict(key);
                return None;
            }
        };

        if entry.key != key {
            tracing::debug!(key, stored = %entry.key, "Cache entry belongs to another key");
            return None;
        }

        if !entry.is_valid(now_millis(), self.ttl, &self.version) {
            tracing::debug!(
                key,
                version = %entry.version,
                timestamp = entry.timestamp,
                "Evicting stale cache entry"
            );
            self.evict(key);
            return None;
        }

        Some(entry)
    }

    /// Store a result. Storage failures are logged and otherwise ignored.
    pub fn put(&self, key: &str, data: &ServiceResult) {
        let entry = CacheEntry {
            key: key.to_string(),
            timestamp: now_millis(),
            version: self.version.clone(),
            data: data.clone(),
        };

        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.write(key, &serialized) {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Remove every entry from the underlying store
    pub fn clear(&self) -> std::io::Result<u64> {
        self.store.clear()
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!("Failed to evict cache entry {}: {}", key, e);
        }
    }
}
