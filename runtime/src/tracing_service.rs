//! Logging decorator for [`ExternalTodoService`].
//!
//! The outermost layer of the chain. Each operation runs inside an
//! `external_todos` span and logs its duration and outcome once it resolves.

use std::future::Future;
use std::time::Instant;
use todo_sync_core::{
    CancellationToken, ExternalServiceError, ExternalTodoService, ProviderId, ServiceFuture,
    TodoRecord,
};
use tracing::Instrument;

/// Wraps an [`ExternalTodoService`] with a span and a completion log line per call.
pub struct TracingExternalTodoService<S> {
    inner: S,
}

impl<S: ExternalTodoService> TracingExternalTodoService<S> {
    /// Wrap `inner`.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

async fn observe<T, F>(
    operation: &'static str,
    fut: F,
    describe: fn(&T) -> String,
) -> Result<T, ExternalServiceError>
where
    F: Future<Output = Result<T, ExternalServiceError>>,
{
    let started = Instant::now();
    let result = fut.await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &result {
        Ok(value) => tracing::info!(
            operation,
            elapsed_ms,
            outcome = %describe(value),
            "External todo operation completed"
        ),
        Err(e) if e.is_cancelled() => {
            tracing::info!(operation, elapsed_ms, "External todo operation cancelled");
        }
        Err(e) => tracing::error!(
            operation,
            elapsed_ms,
            error = %e,
            "External todo operation failed"
        ),
    }

    result
}

impl<S: ExternalTodoService> ExternalTodoService for TracingExternalTodoService<S> {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>> {
        let span = tracing::info_span!("external_todos", operation = "list");
        Box::pin(
            observe("list", self.inner.list(cancel), |items: &Vec<TodoRecord>| {
                format!("{} items", items.len())
            })
            .instrument(span),
        )
    }

    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>> {
        let span = tracing::info_span!("external_todos", operation = "get_by_id", provider_id = id.get());
        Box::pin(
            observe("get_by_id", self.inner.get_by_id(id, cancel), |item: &Option<TodoRecord>| {
                if item.is_some() { "found" } else { "not found" }.to_string()
            })
            .instrument(span),
        )
    }

    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        let span = tracing::info_span!("external_todos", operation = "create", todo_id = %record.id);
        Box::pin(observe("create", self.inner.create(record, cancel), describe_write).instrument(span))
    }

    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        let span = tracing::info_span!("external_todos", operation = "update", provider_id = id.get());
        Box::pin(
            observe("update", self.inner.update(id, record, cancel), describe_write)
                .instrument(span),
        )
    }

    fn delete<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        let span = tracing::info_span!("external_todos", operation = "delete", provider_id = id.get());
        Box::pin(observe("delete", self.inner.delete(id, cancel), describe_write).instrument(span))
    }
}

fn describe_write(succeeded: &bool) -> String {
    if *succeeded { "succeeded" } else { "rejected by provider" }.to_string()
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if the mock misbehaves
mod tests {
    use super::*;
    use std::sync::Arc;
    use todo_sync_testing::MockExternalTodoService;

    #[tokio::test]
    async fn results_and_errors_pass_through_unchanged() {
        let inner = Arc::new(MockExternalTodoService::new());
        inner.set_items(vec![TodoRecord::new("a", "A")]);
        let service = TracingExternalTodoService::new(Arc::clone(&inner));
        let cancel = CancellationToken::new();

        assert_eq!(service.list(&cancel).await.expect("list").len(), 1);

        inner.fail_next(ExternalServiceError::Cancelled);
        let err = service
            .delete(ProviderId::new(1), &cancel)
            .await
            .expect_err("delete should fail");
        assert!(err.is_cancelled());
        assert_eq!(inner.calls().delete, 1);
    }
}
