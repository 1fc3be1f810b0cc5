//! Cache store abstraction for the cache-aside layer.
//!
//! The store is a byte-oriented key-value interface with per-entry expiry, so it
//! can be backed by an in-process map or a remote cache without changing the
//! decorator. Typed access goes through the JSON helpers in this module:
//!
//! - [`get_json`]: read and decode
//! - [`set_json`]: encode and write with a TTL
//! - [`get_or_set_json`]: read, or fetch-and-store on miss
//!
//! # Key scheme
//!
//! | Key                          | Contents                     |
//! |------------------------------|------------------------------|
//! | `external:todos:all`         | the full collection          |
//! | `external:todos:id:{id}`     | a single item by provider id |
//!
//! Every key shares the [`keys::PREFIX`] so a write can invalidate the whole
//! family with one `remove_by_prefix` call.

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Cache key scheme for external todos.
pub mod keys {
    use crate::todo::ProviderId;

    /// Prefix shared by every external todo key.
    pub const PREFIX: &str = "external:todos:";

    /// Key holding the full collection.
    pub const ALL_TODOS: &str = "external:todos:all";

    /// Key holding a single item.
    #[must_use]
    pub fn todo_by_id(id: ProviderId) -> String {
        format!("{PREFIX}id:{id}")
    }
}

/// A cached value together with its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<T> {
    /// Cache key
    pub key: String,
    /// Cached value
    pub value: T,
    /// Instant after which the entry is no longer served
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Create an entry expiring `ttl` after `now`.
    ///
    /// TTLs too large to represent saturate to the maximum timestamp.
    #[must_use]
    pub fn new(key: impl Into<String>, value: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            key: key.into(),
            value,
            expires_at,
        }
    }

    /// Whether the entry has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key-value store with per-entry expiry.
///
/// Implementations must tolerate concurrent reads and writes from many
/// in-flight requests. Strict linearizability is not required.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the store can be shared as
/// `Arc<dyn CacheStore>` between decorators.
pub trait CacheStore: Send + Sync {
    /// Read a live entry. Expired entries read as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the store is unreachable.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>>;

    /// Write an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the store is unreachable.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove a single entry. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the store is unreachable.
    fn remove(&self, key: &str)
    -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove every entry whose key starts with `prefix`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the store is unreachable.
    fn remove_by_prefix(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + '_>>;
}

/// Read and decode a JSON value.
///
/// # Errors
///
/// Returns [`CacheError::Serialization`] if the stored bytes are not a valid `T`,
/// or the store's own error.
pub async fn get_json<S, T>(store: &S, key: &str) -> Result<Option<T>, CacheError>
where
    S: CacheStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Encode a value as JSON and store it with a TTL.
///
/// # Errors
///
/// Returns [`CacheError::Serialization`] if `value` cannot be encoded, or the
/// store's own error.
pub async fn set_json<S, T>(store: &S, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
where
    S: CacheStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, bytes, ttl).await
}

/// Serve `key` from the cache, or run `fetch` and store a present result.
///
/// - A cache read failure is treated as a miss.
/// - A `None` from `fetch` is returned but not cached.
/// - A cache write failure is logged; the fetched value is still returned.
/// - An error from `fetch` is returned unchanged and nothing is cached.
///
/// # Errors
///
/// Returns whatever `fetch` returns.
pub async fn get_or_set_json<S, T, E, F, Fut>(
    store: &S,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<Option<T>, E>
where
    S: CacheStore + ?Sized,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    match get_json::<S, T>(store, key).await {
        Ok(Some(cached)) => {
            tracing::debug!(key, "Cache hit");
            return Ok(Some(cached));
        }
        Ok(None) => tracing::debug!(key, "Cache miss"),
        Err(e) => tracing::warn!(key, error = %e, "Cache read failed, treating as miss"),
    }

    let fetched = fetch().await?;

    if let Some(value) = &fetched {
        if let Err(e) = set_json(store, key, value, ttl).await {
            tracing::warn!(key, error = %e, "Failed to populate cache");
        }
    }

    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::ProviderId;

    #[test]
    fn keys_follow_the_external_todos_scheme() {
        assert_eq!(keys::ALL_TODOS, "external:todos:all");
        assert_eq!(keys::todo_by_id(ProviderId::new(7)), "external:todos:id:7");
        assert!(keys::ALL_TODOS.starts_with(keys::PREFIX));
        assert!(keys::todo_by_id(ProviderId::new(7)).starts_with(keys::PREFIX));
    }

    #[test]
    fn entry_expires_exactly_at_ttl() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", 1, now, Duration::from_secs(300));

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + chrono::Duration::seconds(299)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(300)));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let entry = CacheEntry::new("k", (), Utc::now(), Duration::MAX);
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
