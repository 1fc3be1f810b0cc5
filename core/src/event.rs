//! Domain events announced to other systems.
//!
//! Events are facts about things that have already happened at the provider and
//! are immutable once constructed. On the wire an event is a broker message:
//!
//! - **key**: the event id
//! - **value**: the JSON-serialized event (camelCase field names)
//! - **headers**: `eventType`, `correlationId` and `source` as UTF-8 bytes, so
//!   consumers can filter without deserializing the payload
//!
//! # Example
//!
//! ```
//! use todo_sync_core::event::{CorrelationId, ExternalTodoCreatedEvent};
//! use chrono::Utc;
//!
//! let event = ExternalTodoCreatedEvent::new(
//!     "todo-1",
//!     "Water the plants",
//!     CorrelationId::from("req-42"),
//!     "JSONPlaceholder",
//!     Utc::now(),
//! );
//!
//! let message = event.to_message().unwrap();
//! assert_eq!(message.key, "todo-1");
//! assert_eq!(message.headers.get_str("correlationId"), Some("req-42"));
//! ```

use crate::event_bus::{ConsumedMessage, EventMessage, MessageHeaders};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Header names carried on every event message.
pub mod headers {
    /// Event type discriminator.
    pub const EVENT_TYPE: &str = "eventType";
    /// Correlation id of the originating request.
    pub const CORRELATION_ID: &str = "correlationId";
    /// System that produced the event.
    pub const SOURCE: &str = "source";
}

/// Error types for event encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// The message carried no payload.
    #[error("Message has no payload")]
    MissingPayload,
}

/// Opaque identifier linking a request to its log lines and broker messages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh random correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Announcement that a todo was created at the external provider.
///
/// Created once per successful external creation. Fields are private and only
/// exposed through getters, so an event cannot change after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTodoCreatedEvent {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    source: String,
    event_type: String,
    correlation_id: CorrelationId,
}

impl ExternalTodoCreatedEvent {
    /// Event type discriminator carried in the `eventType` header.
    pub const EVENT_TYPE: &'static str = "ExternalTodoCreated";

    /// Default `source` value.
    pub const DEFAULT_SOURCE: &'static str = "JSONPlaceholder";

    /// Construct an event.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        correlation_id: CorrelationId,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at,
            source: source.into(),
            event_type: Self::EVENT_TYPE.to_string(),
            correlation_id,
        }
    }

    /// Event id (also the broker message key).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Title of the created todo.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Producing system.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Event type discriminator.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Correlation id of the originating request.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Frame the event as a broker message.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn to_message(&self) -> Result<EventMessage, EventError> {
        let payload =
            serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))?;

        let mut message_headers = MessageHeaders::new();
        message_headers.insert(headers::EVENT_TYPE, self.event_type.as_bytes());
        message_headers.insert(headers::CORRELATION_ID, self.correlation_id.as_str().as_bytes());
        message_headers.insert(headers::SOURCE, self.source.as_bytes());

        Ok(EventMessage {
            key: self.id.clone(),
            payload,
            headers: message_headers,
        })
    }

    /// Decode an event from a consumed broker message payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingPayload`] for tombstones and
    /// [`EventError::DeserializationError`] for undecodable payloads.
    pub fn from_message(message: &ConsumedMessage) -> Result<Self, EventError> {
        let payload = message.payload.as_deref().ok_or(EventError::MissingPayload)?;
        serde_json::from_slice(payload).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

impl fmt::Display for ExternalTodoCreatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ id: {}, correlation_id: {} }}",
            self.event_type, self.id, self.correlation_id
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if encoding fails
mod tests {
    use super::*;

    fn sample() -> ExternalTodoCreatedEvent {
        ExternalTodoCreatedEvent::new(
            "todo-1",
            "Water the plants",
            CorrelationId::from("corr-123"),
            ExternalTodoCreatedEvent::DEFAULT_SOURCE,
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should parse")
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let message = sample().to_message().expect("event should encode");
        let json: serde_json::Value =
            serde_json::from_slice(&message.payload).expect("payload should be json");

        assert_eq!(json["id"], "todo-1");
        assert_eq!(json["title"], "Water the plants");
        assert_eq!(json["eventType"], "ExternalTodoCreated");
        assert_eq!(json["correlationId"], "corr-123");
        assert_eq!(json["source"], "JSONPlaceholder");
        assert_eq!(json["createdAt"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn headers_mirror_event_fields_byte_for_byte() {
        let event = sample();
        let message = event.to_message().expect("event should encode");

        assert_eq!(message.headers.len(), 3);
        assert_eq!(
            message.headers.get(headers::EVENT_TYPE),
            Some(event.event_type().as_bytes())
        );
        assert_eq!(
            message.headers.get(headers::CORRELATION_ID),
            Some(event.correlation_id().as_str().as_bytes())
        );
        assert_eq!(message.headers.get(headers::SOURCE), Some(event.source().as_bytes()));
    }

    #[test]
    fn message_key_is_event_id() {
        let message = sample().to_message().expect("event should encode");
        assert_eq!(message.key, "todo-1");
    }

    #[test]
    fn decoding_a_tombstone_reports_missing_payload() {
        let message = ConsumedMessage {
            topic: "t".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: None,
            headers: MessageHeaders::new(),
        };

        assert_eq!(
            ExternalTodoCreatedEvent::from_message(&message),
            Err(EventError::MissingPayload)
        );
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
