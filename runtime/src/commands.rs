//! Application commands over the external todo chain.
//!
//! - `create`: mint a local record, create it at the provider and announce it
//! - `update`: confirm the item exists, then replace its title
//!
//! Publication failures never change the primary result: a created-but-unannounced
//! todo is reported as [`CreateOutcome::Unannounced`] and logged at error level
//! with the event id for manual reconciliation.

use std::sync::Arc;
use thiserror::Error;
use todo_sync_core::environment::{Clock, IdGenerator};
use todo_sync_core::{
    CancellationToken, CorrelationId, EventPublisher, ExternalServiceError, ExternalTodoCreatedEvent,
    ExternalTodoService, ProviderId, PublishError, TodoRecord,
};

/// Maximum accepted title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Failure of a command before or during the provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The input was rejected before reaching the provider.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The provider chain failed.
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
}

/// Result of a create-and-announce command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The provider did not accept the todo. Nothing was published.
    Rejected,
    /// The todo was created and its event acknowledged by the broker.
    Announced(TodoRecord),
    /// The todo was created but its event was not delivered.
    Unannounced {
        /// The created record
        record: TodoRecord,
        /// Why the event was not delivered
        error: PublishError,
    },
}

impl CreateOutcome {
    /// The created record, whether or not it was announced.
    #[must_use]
    pub const fn record(&self) -> Option<&TodoRecord> {
        match self {
            Self::Rejected => None,
            Self::Announced(record) | Self::Unannounced { record, .. } => Some(record),
        }
    }
}

/// Result of an update command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No item exists under the given provider id.
    NotFound,
    /// The provider did not accept the update.
    Rejected,
    /// The item was updated.
    Updated(TodoRecord),
}

/// Create and update commands bound to a service chain and a publisher.
pub struct ExternalTodoCommands {
    service: Arc<dyn ExternalTodoService>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    source: String,
}

impl ExternalTodoCommands {
    /// Bind commands to `service` and `publisher`.
    #[must_use]
    pub fn new(
        service: Arc<dyn ExternalTodoService>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            service,
            publisher,
            clock,
            ids,
            source: ExternalTodoCreatedEvent::DEFAULT_SOURCE.to_string(),
        }
    }

    /// Override the `source` stamped on created events.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Create a todo at the provider and announce it.
    ///
    /// The record gets a fresh local id, which also becomes the event id.
    /// Nothing is published when the provider rejects the todo or when `cancel`
    /// fired before publication.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] for an empty or overlong title and
    /// [`CommandError::Service`] if the provider chain fails or the caller
    /// cancelled.
    pub async fn create(
        &self,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, CommandError> {
        validate_title(title)?;

        let correlation_id = CorrelationId::new();
        let record = TodoRecord::new(self.ids.next_id(), title);
        tracing::info!(
            correlation_id = %correlation_id,
            todo_id = %record.id,
            "Creating external todo"
        );

        if !self.service.create(&record, cancel).await? {
            tracing::error!(correlation_id = %correlation_id, "Provider rejected external todo");
            return Ok(CreateOutcome::Rejected);
        }

        if cancel.is_cancelled() {
            tracing::warn!(
                correlation_id = %correlation_id,
                todo_id = %record.id,
                "Cancelled after creation, event not published"
            );
            return Err(ExternalServiceError::Cancelled.into());
        }

        let event = ExternalTodoCreatedEvent::new(
            record.id.clone(),
            record.title.clone(),
            correlation_id,
            self.source.clone(),
            self.clock.now(),
        );

        match self.publisher.publish_external_todo_created(&event, cancel).await {
            Ok(()) => Ok(CreateOutcome::Announced(record)),
            Err(error) => {
                tracing::error!(
                    event_id = %error.event_id(),
                    correlation_id = %event.correlation_id(),
                    error = %error,
                    "External todo created but event not published"
                );
                Ok(CreateOutcome::Unannounced { record, error })
            }
        }
    }

    /// Replace the title of the item addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] for an empty or overlong title and
    /// [`CommandError::Service`] if the provider chain fails.
    pub async fn update(
        &self,
        id: ProviderId,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, CommandError> {
        validate_title(title)?;

        let Some(existing) = self.service.get_by_id(id, cancel).await? else {
            tracing::warn!(provider_id = id.get(), "External todo not found");
            return Ok(UpdateOutcome::NotFound);
        };

        let record = TodoRecord::new(existing.id, title);
        if self.service.update(id, &record, cancel).await? {
            tracing::info!(provider_id = id.get(), "Updated external todo");
            Ok(UpdateOutcome::Updated(record))
        } else {
            tracing::error!(provider_id = id.get(), "Provider rejected external todo update");
            Ok(UpdateOutcome::Rejected)
        }
    }
}

fn validate_title(title: &str) -> Result<(), CommandError> {
    if title.trim().is_empty() {
        return Err(CommandError::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CommandError::Validation(format!(
            "Title must not exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}
