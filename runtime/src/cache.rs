//! In-process [`CacheStore`] backed by a concurrent map.
//!
//! Entries carry an absolute expiry computed from the injected [`Clock`], so
//! tests can move time forward without sleeping. Expired entries are dropped
//! lazily on read and in bulk by [`InMemoryCacheStore::purge_expired`].

use crate::metrics::CacheMetrics;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use todo_sync_core::environment::{Clock, SystemClock};
use todo_sync_core::{CacheEntry, CacheError, CacheStore};

/// Shared, concurrently mutable in-memory cache.
///
/// Cloning is cheap and clones share the same entries.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<String, CacheEntry<Vec<u8>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            CacheMetrics::record_purge(removed);
            tracing::debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    fn get_live(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let value = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        };

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        value
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>> {
        let value = self.get_live(key);
        Box::pin(async move { Ok(value) })
    }

    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        self.entries.insert(key.to_string(), entry);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }

    fn remove_by_prefix(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + '_>> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        Box::pin(async move { Ok(removed) })
    }
}
