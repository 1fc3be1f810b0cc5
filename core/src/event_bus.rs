//! Event bus abstraction for announcing external todo changes.
//!
//! This module provides the broker-facing traits of the pipeline:
//!
//! - [`EventBus`]: producer side, owns a long-lived broker connection
//! - [`MessageSource`]: consumer side, a subscription polled one message at a time
//! - [`EventPublisher`]: domain-level publishing of [`ExternalTodoCreatedEvent`]s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ create succeeded │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  EventPublisher  │  key = event id, value = JSON, headers
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     EventBus     │◄─── idempotent producer, acks from all replicas
//! └────────┬─────────┘
//!          │ broker
//!          ▼
//! ┌──────────────────┐
//! │  MessageSource   │◄─── at-least-once, commit after dispatch
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ MessageProcessor │
//! └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: messages may be delivered more than once
//! - **Idempotency**: processors must tolerate duplicates (use the event id or correlation id)
//! - **No rollback**: a failed publish never undoes the provider write that triggered it
//!
//! # Implementations
//!
//! - `InMemoryEventBus` / `InMemoryMessageSource` in `todo-sync-testing`
//! - `RedpandaEventBus` / `RedpandaMessageSource` in `todo-sync-redpanda`

use crate::event::ExternalTodoCreatedEvent;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a topic
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed to subscribe
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to commit a consumed offset
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Failed to flush in-flight messages before shutdown
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The bus was already shut down
    #[error("Event bus is closed")]
    Closed,
}

/// Ordered list of message headers with byte values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageHeaders(Vec<(String, Vec<u8>)>);

impl MessageHeaders {
    /// Create an empty header list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First value for `key`, if it is valid UTF-8.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A message ready to be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMessage {
    /// Partitioning key
    pub key: String,
    /// Serialized payload
    pub payload: Vec<u8>,
    /// Metadata readable without decoding the payload
    pub headers: MessageHeaders,
}

/// A message received from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumedMessage {
    /// Topic the message was read from
    pub topic: String,
    /// Partition the message was read from
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Message key, if any
    pub key: Option<String>,
    /// Payload bytes (`None` for tombstones)
    pub payload: Option<Vec<u8>>,
    /// Message headers
    pub headers: MessageHeaders,
}

impl ConsumedMessage {
    /// Payload as text, replacing invalid UTF-8. Empty for tombstones.
    #[must_use]
    pub fn payload_text(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}

/// Producer side of the broker.
///
/// # Thread Safety
///
/// Implementations own a single long-lived connection that is shared by all
/// concurrent publishers, so they must be `Send + Sync` and safe to call
/// concurrently without external locking.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic and wait for the broker's acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] once the producer's internal
    /// retries are exhausted, or [`EventBusError::Closed`] after shutdown.
    fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Wait up to `timeout` for in-flight messages to be delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::FlushFailed`] if messages remain undelivered.
    fn flush(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}

/// Consumer side of the broker: a single subscription polled in a loop.
///
/// A source is owned by exactly one consumer task, hence `&mut self` and no
/// `Sync` bound.
pub trait MessageSource: Send {
    /// Whether `topic` exists on the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if metadata cannot be fetched.
    fn topic_exists(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EventBusError>> + Send + '_>>;

    /// Subscribe to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the broker rejects the subscription.
    fn subscribe(&mut self, topic: &str) -> Result<(), EventBusError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` means nothing arrived.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the broker reports a consume error.
    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConsumedMessage>, EventBusError>> + Send + '_>>;

    /// Mark `message` as processed.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::CommitFailed`] if the offset cannot be stored.
    fn commit(&mut self, message: &ConsumedMessage) -> Result<(), EventBusError>;

    /// Leave the subscription and release the connection.
    fn close(&mut self);
}

/// Failure to announce an event, after the producer's own retries.
///
/// Never rolls back the provider write that triggered the publish; the event id
/// is carried for manual reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The event could not be framed as a message.
    #[error("Failed to encode event {event_id}: {reason}")]
    Encoding {
        /// Event that could not be encoded
        event_id: String,
        /// Encoder message
        reason: String,
    },

    /// The broker rejected or never acknowledged the message.
    #[error("Failed to publish event {event_id}: {source}")]
    Broker {
        /// Event that was not delivered
        event_id: String,
        /// Broker-reported reason
        source: EventBusError,
    },

    /// The caller cancelled before the event was sent.
    #[error("Publication of event {event_id} cancelled")]
    Cancelled {
        /// Event that was not sent
        event_id: String,
    },

    /// The publisher was already shut down.
    #[error("Publisher closed, event {event_id} not sent")]
    Closed {
        /// Event that was not sent
        event_id: String,
    },
}

impl PublishError {
    /// Id of the event that was not delivered.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::Encoding { event_id, .. }
            | Self::Broker { event_id, .. }
            | Self::Cancelled { event_id }
            | Self::Closed { event_id } => event_id,
        }
    }
}

/// Domain-level publisher of external todo events.
pub trait EventPublisher: Send + Sync {
    /// Publish an [`ExternalTodoCreatedEvent`] to the configured topic.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the broker does not acknowledge the message,
    /// the caller cancelled first, or the publisher is closed.
    fn publish_external_todo_created<'a>(
        &'a self,
        event: &'a ExternalTodoCreatedEvent,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_preserve_insertion_order_and_lookup_first_match() {
        let mut headers = MessageHeaders::new();
        headers.insert("a", "1");
        headers.insert("b", "2");
        headers.insert("a", "3");

        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
        assert_eq!(headers.get_str("a"), Some("1"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn non_utf8_header_has_no_str_view() {
        let mut headers = MessageHeaders::new();
        headers.insert("bin", vec![0xff, 0xfe]);
        assert!(headers.get("bin").is_some());
        assert_eq!(headers.get_str("bin"), None);
    }

    #[test]
    fn publish_error_exposes_event_id() {
        let err = PublishError::Broker {
            event_id: "evt-1".to_string(),
            source: EventBusError::PublishFailed {
                topic: "t".to_string(),
                reason: "timeout".to_string(),
            },
        };
        assert_eq!(err.event_id(), "evt-1");
        assert!(err.to_string().contains("evt-1"));
    }

    #[test]
    fn payload_text_is_empty_for_tombstones() {
        let message = ConsumedMessage {
            topic: "t".to_string(),
            partition: 0,
            offset: 3,
            key: None,
            payload: None,
            headers: MessageHeaders::new(),
        };
        assert_eq!(message.payload_text(), "");
    }
}
