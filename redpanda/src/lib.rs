//! Redpanda event bus implementation for the external todo sync pipeline.
//!
//! This crate provides Kafka-protocol implementations of the broker traits from
//! `todo-sync-core`, built on rdkafka:
//!
//! - [`RedpandaEventBus`]: an idempotent producer implementing [`EventBus`]
//! - [`RedpandaMessageSource`]: a single-topic consumer implementing
//!   [`MessageSource`](todo_sync_core::MessageSource)
//!
//! Any Kafka-compatible broker works (Redpanda, Apache Kafka, MSK, ...).
//!
//! # Delivery Semantics
//!
//! **Producer**: idempotence is enabled and every send waits for acknowledgment
//! from all in-sync replicas. rdkafka retries internally without producing
//! duplicates; once its retries are exhausted the send fails with
//! [`EventBusError::PublishFailed`].
//!
//! **Consumer**: at-least-once with manual commits. The consumer loop commits
//! each message after dispatching it; a crash before the commit means the
//! message is redelivered.
//!
//! # Example
//!
//! ```no_run
//! use todo_sync_redpanda::RedpandaEventBus;
//! use todo_sync_core::{EventBus, EventMessage, MessageHeaders};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let mut headers = MessageHeaders::new();
//! headers.insert("eventType", "ExternalTodoCreated");
//! let message = EventMessage {
//!     key: "todo-1".to_string(),
//!     payload: br#"{"id":"todo-1"}"#.to_vec(),
//!     headers,
//! };
//! event_bus.publish("external-todos-created", &message).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod source;

pub use source::{RedpandaMessageSource, RedpandaMessageSourceBuilder};

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use todo_sync_core::{EventBus, EventBusError, EventMessage, MessageHeaders};

/// Default producer delivery timeout (`message.timeout.ms`).
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Internal producer retries before a send is reported as failed.
pub const DEFAULT_SEND_RETRIES: u32 = 3;

/// Redpanda event bus implementation.
///
/// Owns one long-lived producer connection. `FutureProducer` is internally
/// reference counted, so concurrent `publish` calls share it without locking.
///
/// # Configuration
///
/// - **Brokers**: bootstrap servers (required)
/// - **Message timeout**: how long rdkafka may keep retrying a send (default: 5s)
/// - **Send retries**: internal retries (default: 3, backoff 100ms)
/// - **Compression**: codec for batches (default: "none")
///
/// Idempotence and `acks=all` are always on.
///
/// # Example
///
/// ```no_run
/// use todo_sync_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .message_timeout(Duration::from_secs(5))
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    message_timeout: Duration,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("message_timeout", &self.message_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default, Debug)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    message_timeout: Option<Duration>,
    send_retries: Option<u32>,
    compression: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set how long a message may stay undelivered before the send fails.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = Some(timeout);
        self
    }

    /// Set the number of internal send retries.
    ///
    /// Default: 3
    #[must_use]
    pub const fn send_retries(mut self, retries: u32) -> Self {
        self.send_retries = Some(retries);
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let message_timeout = self.message_timeout.unwrap_or(DEFAULT_MESSAGE_TIMEOUT);
        let send_retries = self.send_retries.unwrap_or(DEFAULT_SEND_RETRIES);
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", millis(message_timeout))
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.send.max.retries", send_retries.to_string())
            .set("retry.backoff.ms", "100")
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            message_timeout_ms = millis(message_timeout),
            send_retries,
            compression,
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            message_timeout,
        })
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}

fn to_kafka_headers(headers: &MessageHeaders) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(value),
            })
        })
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let message = message.clone();

        Box::pin(async move {
            let record = FutureRecord::to(&topic)
                .key(&message.key)
                .payload(&message.payload)
                .headers(to_kafka_headers(&message.headers));

            // Queue timeout only; delivery is bounded by message.timeout.ms
            match self
                .producer
                .send(record, Timeout::After(self.message_timeout))
                .await
            {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        key = %message.key,
                        "Message published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %message.key,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn flush(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let producer = self.producer.clone();

        Box::pin(async move {
            // rdkafka's flush blocks the calling thread
            let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
                .await
                .map_err(|e| EventBusError::FlushFailed(e.to_string()))?;

            flushed.map_err(|e| {
                tracing::error!(error = %e, "Producer flush incomplete");
                EventBusError::FlushFailed(e.to_string())
            })?;

            tracing::info!("Producer flushed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::Headers;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn headers_keep_order_and_bytes() {
        let mut headers = MessageHeaders::new();
        headers.insert("eventType", "ExternalTodoCreated");
        headers.insert("correlationId", "c-1");

        let kafka = to_kafka_headers(&headers);

        assert_eq!(kafka.count(), 2);
        let first = kafka.get(0);
        assert_eq!(first.key, "eventType");
        assert_eq!(first.value, Some(&b"ExternalTodoCreated"[..]));
        assert_eq!(kafka.get(1).value, Some(&b"c-1"[..]));
    }
}
