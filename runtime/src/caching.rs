//! Cache-aside decorator for [`ExternalTodoService`].
//!
//! # Reads
//!
//! `list` and `get_by_id` check the cache first. On a miss they call the inner
//! service and store a present result with the configured TTL. The collection
//! and each item are tracked under independent keys.
//!
//! # Writes
//!
//! `create`, `update` and `delete` delegate first. Only when the inner service
//! reports success are the affected keys invalidated, and invalidation has
//! finished by the time the write returns. A failed or cancelled write leaves
//! the cache untouched.
//!
//! Inner errors always propagate; the decorator never falls back to a stale
//! cached value.

use crate::metrics::CacheMetrics;
use std::sync::Arc;
use std::time::Duration;
use todo_sync_core::cache::get_or_set_json;
use todo_sync_core::{
    CacheStore, CancellationToken, ExternalServiceError, ExternalTodoService, ProviderId,
    ServiceFuture, TodoRecord, keys,
};

/// Default time-to-live of cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Wraps an [`ExternalTodoService`] with cache-aside reads and
/// invalidate-on-success writes.
pub struct CachingExternalTodoService<S> {
    inner: S,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl<S: ExternalTodoService> CachingExternalTodoService<S> {
    /// Wrap `inner`, caching through `cache` with [`DEFAULT_TTL`].
    #[must_use]
    pub fn new(inner: S, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the time-to-live of cached entries.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The wrapped service.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Remove the collection key, every prefixed key and, if given, the item key.
    async fn invalidate(&self, id: Option<ProviderId>) -> Result<(), ExternalServiceError> {
        let item_key = id.map(keys::todo_by_id);

        let remove_item = async {
            match &item_key {
                Some(key) => self.cache.remove(key).await,
                None => Ok(()),
            }
        };

        let ((), prefixed, ()) = futures::try_join!(
            self.cache.remove(keys::ALL_TODOS),
            self.cache.remove_by_prefix(keys::PREFIX),
            remove_item,
        )?;

        CacheMetrics::record_invalidation(prefixed);
        tracing::debug!(
            provider_id = id.map(ProviderId::get),
            removed = prefixed,
            "Invalidated external todo cache"
        );
        Ok(())
    }

    async fn after_write(
        &self,
        succeeded: bool,
        id: Option<ProviderId>,
    ) -> Result<bool, ExternalServiceError> {
        if succeeded {
            // The write already happened at the provider; report it as such
            if let Err(e) = self.invalidate(id).await {
                tracing::error!(
                    provider_id = id.map(ProviderId::get),
                    error = %e,
                    "Cache invalidation failed after a successful write, entries may be stale until TTL"
                );
            }
        }
        Ok(succeeded)
    }
}

impl<S: ExternalTodoService> ExternalTodoService for CachingExternalTodoService<S> {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>> {
        Box::pin(async move {
            let mut fetched = false;
            let missed = &mut fetched;
            let items = get_or_set_json(self.cache.as_ref(), keys::ALL_TODOS, self.ttl, move || {
                *missed = true;
                async move { self.inner.list(cancel).await.map(Some) }
            })
            .await?;

            record_lookup(fetched);
            Ok(items.unwrap_or_default())
        })
    }

    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>> {
        Box::pin(async move {
            let key = keys::todo_by_id(id);
            let mut fetched = false;
            let missed = &mut fetched;
            let item = get_or_set_json(self.cache.as_ref(), &key, self.ttl, move || {
                *missed = true;
                self.inner.get_by_id(id, cancel)
            })
            .await?;

            record_lookup(fetched);
            Ok(item)
        })
    }

    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let created = self.inner.create(record, cancel).await?;
            self.after_write(created, None).await
        })
    }

    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let updated = self.inner.update(id, record, cancel).await?;
            self.after_write(updated, Some(id)).await
        })
    }

    fn delete<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let deleted = self.inner.delete(id, cancel).await?;
            self.after_write(deleted, Some(id)).await
        })
    }
}

fn record_lookup(fetched: bool) {
    if fetched {
        CacheMetrics::record_miss();
    } else {
        CacheMetrics::record_hit();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if the mock or cache misbehaves
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use todo_sync_core::cache::set_json;
    use todo_sync_core::{CacheError, TransportError};
    use todo_sync_testing::{ManualClock, MockExternalTodoService};

    struct Fixture {
        inner: Arc<MockExternalTodoService>,
        store: InMemoryCacheStore,
        clock: Arc<ManualClock>,
        service: CachingExternalTodoService<Arc<MockExternalTodoService>>,
    }

    fn fixture() -> Fixture {
        let inner = Arc::new(MockExternalTodoService::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let store = InMemoryCacheStore::with_clock(clock.clone());
        let service = CachingExternalTodoService::new(Arc::clone(&inner), Arc::new(store.clone()));
        Fixture {
            inner,
            store,
            clock,
            service,
        }
    }

    #[tokio::test]
    async fn list_hit_does_not_call_inner() {
        let f = fixture();
        let cached = vec![TodoRecord::new("cached", "From cache")];
        set_json(&f.store, keys::ALL_TODOS, &cached, DEFAULT_TTL)
            .await
            .expect("seed cache");

        let items = f.service.list(&CancellationToken::new()).await.expect("list");

        assert_eq!(items, cached);
        assert_eq!(f.inner.calls().list, 0);
    }

    #[tokio::test]
    async fn list_miss_fetches_once_and_stores() {
        let f = fixture();
        f.inner.set_items(vec![TodoRecord::new("a", "First")]);
        let cancel = CancellationToken::new();

        let first = f.service.list(&cancel).await.expect("list");
        let second = f.service.list(&cancel).await.expect("list");

        assert_eq!(first, second);
        assert_eq!(f.inner.calls().list, 1);
        assert!(f.store.contains_key(keys::ALL_TODOS));
    }

    #[tokio::test]
    async fn cached_entry_expires_after_ttl() {
        let f = fixture();
        let cancel = CancellationToken::new();
        f.service.list(&cancel).await.expect("list");

        f.clock.advance(DEFAULT_TTL);
        f.service.list(&cancel).await.expect("list");

        assert_eq!(f.inner.calls().list, 2);
    }

    #[tokio::test]
    async fn get_by_id_caches_present_items_only() {
        let f = fixture();
        let cancel = CancellationToken::new();
        f.inner.set_item(ProviderId::new(1), Some(TodoRecord::new("x", "One")));

        f.service.get_by_id(ProviderId::new(1), &cancel).await.expect("get");
        f.service.get_by_id(ProviderId::new(1), &cancel).await.expect("get");
        assert_eq!(f.inner.calls().get_by_id, 1);

        let absent = f.service.get_by_id(ProviderId::new(2), &cancel).await.expect("get");
        assert_eq!(absent, None);
        assert!(!f.store.contains_key(&keys::todo_by_id(ProviderId::new(2))));
    }

    #[tokio::test]
    async fn successful_update_invalidates_item_and_collection() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let id = ProviderId::new(3);
        f.inner.set_item(id, Some(TodoRecord::new("old", "Before")));
        f.service.list(&cancel).await.expect("list");
        f.service.get_by_id(id, &cancel).await.expect("get");

        f.inner.set_item(id, Some(TodoRecord::new("new", "After")));
        let updated = f
            .service
            .update(id, &TodoRecord::new("new", "After"), &cancel)
            .await
            .expect("update");
        assert!(updated);

        let fresh = f.service.get_by_id(id, &cancel).await.expect("get");
        assert_eq!(fresh.map(|r| r.title), Some("After".to_string()));
        assert_eq!(f.inner.calls().get_by_id, 2);
        assert!(!f.store.contains_key(keys::ALL_TODOS));
    }

    #[tokio::test]
    async fn failed_create_leaves_cache_untouched() {
        let f = fixture();
        let cancel = CancellationToken::new();
        f.service.list(&cancel).await.expect("list");
        f.inner.set_write_result(false);

        let created = f
            .service
            .create(&TodoRecord::new("n", "New"), &cancel)
            .await
            .expect("create");

        assert!(!created);
        assert!(f.store.contains_key(keys::ALL_TODOS));
    }

    #[tokio::test]
    async fn inner_error_propagates_without_stale_fallback() {
        let f = fixture();
        f.inner.fail_next(ExternalServiceError::Transport(TransportError::Timeout(
            Duration::from_secs(10),
        )));

        let result = f.service.list(&CancellationToken::new()).await;

        assert!(matches!(result, Err(ExternalServiceError::Transport(_))));
        assert!(!f.store.contains_key(keys::ALL_TODOS));
    }

    #[tokio::test]
    async fn successful_delete_clears_every_prefixed_key() {
        let f = fixture();
        let cancel = CancellationToken::new();
        for id in 1..=3 {
            f.inner.set_item(ProviderId::new(id), Some(TodoRecord::new("x", "y")));
            f.service.get_by_id(ProviderId::new(id), &cancel).await.expect("get");
        }

        assert!(f.service.delete(ProviderId::new(1), &cancel).await.expect("delete"));

        for id in 1..=3 {
            assert!(!f.store.contains_key(&keys::todo_by_id(ProviderId::new(id))));
        }
    }

    #[tokio::test]
    async fn cancelled_update_keeps_cached_entries() {
        let f = fixture();
        let id = ProviderId::new(4);
        set_json(&f.store, keys::ALL_TODOS, &vec![TodoRecord::new("a", "A")], DEFAULT_TTL)
            .await
            .expect("seed collection");
        set_json(&f.store, &keys::todo_by_id(id), &TodoRecord::new("a", "A"), DEFAULT_TTL)
            .await
            .expect("seed item");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .service
            .update(id, &TodoRecord::new("a", "Renamed"), &cancel)
            .await
            .expect_err("cancelled update should fail");

        assert!(err.is_cancelled());
        assert!(f.store.contains_key(keys::ALL_TODOS));
        assert!(f.store.contains_key(&keys::todo_by_id(id)));
        assert!(f.inner.written().is_empty());
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(
            &self,
            _key: &str,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>,
        > {
            Box::pin(async { Err(CacheError::Backend("down".into())) })
        }

        fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), CacheError>> + Send + '_>>
        {
            Box::pin(async { Err(CacheError::Backend("down".into())) })
        }

        fn remove(
            &self,
            _key: &str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), CacheError>> + Send + '_>>
        {
            Box::pin(async { Err(CacheError::Backend("down".into())) })
        }

        fn remove_by_prefix(
            &self,
            _prefix: &str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<usize, CacheError>> + Send + '_>>
        {
            Box::pin(async { Err(CacheError::Backend("down".into())) })
        }
    }

    #[tokio::test]
    async fn unavailable_cache_reads_through() {
        let inner = Arc::new(MockExternalTodoService::new());
        inner.set_items(vec![TodoRecord::new("a", "A")]);
        let service = CachingExternalTodoService::new(Arc::clone(&inner), Arc::new(BrokenStore));

        let items = service
            .list(&CancellationToken::new())
            .await
            .expect("list reads through");
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn failed_invalidation_still_reports_the_provider_write() {
        let inner = Arc::new(MockExternalTodoService::new());
        let service = CachingExternalTodoService::new(Arc::clone(&inner), Arc::new(BrokenStore));
        let cancel = CancellationToken::new();

        let created = service
            .create(&TodoRecord::new("b", "B"), &cancel)
            .await
            .expect("create reports the provider result");
        let deleted = service
            .delete(ProviderId::new(1), &cancel)
            .await
            .expect("delete reports the provider result");

        assert!(created);
        assert!(deleted);
        assert_eq!(inner.written(), vec![TodoRecord::new("b", "B")]);
    }
}
