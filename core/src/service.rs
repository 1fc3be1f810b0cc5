//! The external todo capability shared by every layer of the chain.

use crate::error::ExternalServiceError;
use crate::todo::{ProviderId, TodoRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Boxed future returned by [`ExternalTodoService`] operations.
pub type ServiceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ExternalServiceError>> + Send + 'a>>;

/// CRUD access to todos held by the external provider.
///
/// The provider client, the cache-aside decorator and the tracing decorator
/// all implement this trait, each wrapping the next.
///
/// # Write results
///
/// `create`, `update` and `delete` return `Ok(true)` iff the provider reported
/// success and `Ok(false)` if it answered with a non-success status. Network
/// failures and cancellation are errors.
///
/// # Cancellation
///
/// Every operation takes a [`CancellationToken`]. The innermost network call
/// observes it; a cancelled operation returns an error whose
/// [`ExternalServiceError::is_cancelled`] is `true`.
pub trait ExternalTodoService: Send + Sync {
    /// Fetch every item. An empty provider response is an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalServiceError`] if the provider cannot be reached or
    /// answers with an error status or an undecodable body.
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>>;

    /// Fetch a single item. `Ok(None)` means the provider confirmed absence.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalServiceError`] for any failure other than absence.
    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>>;

    /// Create an item. The record's local id stays the system's identity.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalServiceError`] if the provider cannot be reached.
    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool>;

    /// Replace the title of the item addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalServiceError`] if the provider cannot be reached.
    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool>;

    /// Delete the item addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalServiceError`] if the provider cannot be reached.
    fn delete<'a>(&'a self, id: ProviderId, cancel: &'a CancellationToken)
    -> ServiceFuture<'a, bool>;
}

impl<S: ExternalTodoService + ?Sized> ExternalTodoService for Arc<S> {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>> {
        (**self).list(cancel)
    }

    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>> {
        (**self).get_by_id(id, cancel)
    }

    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        (**self).create(record, cancel)
    }

    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        (**self).update(id, record, cancel)
    }

    fn delete<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        (**self).delete(id, cancel)
    }
}
