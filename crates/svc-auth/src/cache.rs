//! Expiring key/value cache.
//!
//! Entries carry an absolute expiration (Unix seconds) that already has the
//! configured margin subtracted. Reads compare against the caller-supplied
//! `now` and never hand out an entry whose adjusted expiration is at or before
//! it. Expired entries stay in the map until overwritten or reset; there is no
//! background eviction.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: i64,
}

/// Concurrency-safe cache keyed by string.
///
/// Readers share the lock; writes and resets take it exclusively, so the value
/// observed for a key is always the last completed write. The backing map is
/// created on the first write.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: RwLock<Option<HashMap<String, CacheEntry<V>>>>,
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(None),
        }
    }
}

impl<V: Clone> ExpiringCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `key` if present and still valid at `now`.
    pub async fn read(&self, key: &str, now: i64) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .as_ref()?
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, valid until `expires_at - margin`.
    ///
    /// Overwrites any existing entry for the key.
    pub async fn write(&self, key: &str, value: V, expires_at: i64, margin: Duration) {
        let margin_secs = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            value,
            expires_at: expires_at.saturating_sub(margin_secs),
        };

        let mut entries = self.entries.write().await;
        entries
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), entry);
    }

    /// Drop every entry.
    pub async fn reset(&self) {
        let mut entries = self.entries.write().await;
        *entries = None;
    }

    /// Adjusted expiration stored for `key`, regardless of whether it has passed.
    pub async fn expires_at(&self, key: &str) -> Option<i64> {
        let entries = self.entries.read().await;
        entries.as_ref()?.get(key).map(|entry| entry.expires_at)
    }
}
