//! JSONPlaceholder-style external todo client

use crate::transport::{ResilientTransport, TransportRequest, TransportResponse};
use crate::types::ExternalProviderItem;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use todo_sync_core::environment::IdGenerator;
use todo_sync_core::{
    CancellationToken, ExternalServiceError, ExternalTodoService, ProviderId, ServiceFuture,
    TodoRecord,
};

/// Owner id sent with writes when none is configured.
pub const DEFAULT_OWNER_ID: i64 = 1;

const TODOS: &str = "todos";

/// External todo client for a JSONPlaceholder-compatible `/todos` resource.
///
/// Items read from the provider get a freshly minted local id every time they
/// are translated; the provider id is only used to address the provider.
#[derive(Clone)]
pub struct JsonPlaceholderClient {
    transport: ResilientTransport,
    ids: Arc<dyn IdGenerator>,
    owner_id: i64,
}

impl JsonPlaceholderClient {
    /// Create a client over `transport`, minting local ids with `ids`.
    #[must_use]
    pub fn new(transport: ResilientTransport, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            transport,
            ids,
            owner_id: DEFAULT_OWNER_ID,
        }
    }

    /// Set the `userId` sent with creates and updates.
    #[must_use]
    pub const fn with_owner_id(mut self, owner_id: i64) -> Self {
        self.owner_id = owner_id;
        self
    }

    fn to_record(&self, item: ExternalProviderItem) -> TodoRecord {
        item.into_record(self.ids.next_id())
    }

    async fn write(
        &self,
        operation: &'static str,
        request: TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<bool, ExternalServiceError> {
        let response = self.transport.send(&request, cancel).await?;
        if response.is_success() {
            tracing::info!(operation, path = request.path(), "Provider accepted write");
            Ok(true)
        } else {
            tracing::error!(
                operation,
                path = request.path(),
                status = response.status().as_u16(),
                "Provider rejected write"
            );
            Ok(false)
        }
    }
}

impl std::fmt::Debug for JsonPlaceholderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonPlaceholderClient")
            .field("base_url", &self.transport.base_url().as_str())
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: &TransportResponse,
) -> Result<T, ExternalServiceError> {
    serde_json::from_slice(response.body()).map_err(|e| ExternalServiceError::MalformedResponse {
        operation,
        reason: e.to_string(),
    })
}

fn item_path(id: ProviderId) -> String {
    format!("{TODOS}/{id}")
}

impl ExternalTodoService for JsonPlaceholderClient {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFuture<'a, Vec<TodoRecord>> {
        Box::pin(async move {
            let response = self.transport.send(&TransportRequest::get(TODOS), cancel).await?;

            if !response.is_success() {
                return Err(ExternalServiceError::UnexpectedStatus {
                    operation: "list",
                    status: response.status().as_u16(),
                });
            }

            if response.has_empty_body() {
                tracing::warn!("No todos received from provider");
                return Ok(Vec::new());
            }

            let items: Vec<ExternalProviderItem> = decode("list", &response)?;
            tracing::debug!(count = items.len(), "Fetched todos from provider");
            Ok(items.into_iter().map(|item| self.to_record(item)).collect())
        })
    }

    fn get_by_id<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, Option<TodoRecord>> {
        Box::pin(async move {
            let response = self
                .transport
                .send(&TransportRequest::get(item_path(id)), cancel)
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                tracing::warn!(provider_id = id.get(), "Todo not found at provider");
                return Ok(None);
            }

            if !response.is_success() {
                return Err(ExternalServiceError::UnexpectedStatus {
                    operation: "get_by_id",
                    status: response.status().as_u16(),
                });
            }

            if response.has_empty_body() {
                tracing::warn!(provider_id = id.get(), "Provider returned an empty todo");
                return Ok(None);
            }

            let item: ExternalProviderItem = decode("get_by_id", &response)?;
            Ok(Some(self.to_record(item)))
        })
    }

    fn create<'a>(
        &'a self,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let body = ExternalProviderItem::outgoing(None, self.owner_id, record.title.as_str());
            let request = TransportRequest::post_json(TODOS, &body)?;
            self.write("create", request, cancel).await
        })
    }

    fn update<'a>(
        &'a self,
        id: ProviderId,
        record: &'a TodoRecord,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            let body = ExternalProviderItem::outgoing(Some(id), self.owner_id, record.title.as_str());
            let request = TransportRequest::put_json(item_path(id), &body)?;
            self.write("update", request, cancel).await
        })
    }

    fn delete<'a>(
        &'a self,
        id: ProviderId,
        cancel: &'a CancellationToken,
    ) -> ServiceFuture<'a, bool> {
        Box::pin(async move {
            self.write("delete", TransportRequest::delete(item_path(id)), cancel)
                .await
        })
    }
}
