//! Kafka consumer implementing [`MessageSource`].

use rdkafka::TopicPartitionList;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::Offset;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use todo_sync_core::{ConsumedMessage, EventBusError, MessageHeaders, MessageSource};

/// Default consumer group.
pub const DEFAULT_GROUP_ID: &str = "todo-system-consumers";

/// Default timeout for broker metadata requests.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// A single-topic Kafka subscription with manual offset commits.
///
/// Auto-commit is disabled; offsets are committed through
/// [`MessageSource::commit`] after the consumer loop has dispatched a message.
///
/// # Example
///
/// ```no_run
/// use todo_sync_redpanda::RedpandaMessageSource;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = RedpandaMessageSource::builder()
///     .brokers("localhost:9092")
///     .group_id("todo-system-consumers")
///     .auto_offset_reset("earliest")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaMessageSource {
    consumer: Arc<StreamConsumer>,
    group_id: String,
    metadata_timeout: Duration,
    closed: bool,
}

impl RedpandaMessageSource {
    /// Create a new builder for configuring the source.
    #[must_use]
    pub fn builder() -> RedpandaMessageSourceBuilder {
        RedpandaMessageSourceBuilder::default()
    }

    /// Consumer group this source joins.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl std::fmt::Debug for RedpandaMessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaMessageSource")
            .field("group_id", &self.group_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaMessageSource`].
#[derive(Default, Debug)]
pub struct RedpandaMessageSourceBuilder {
    brokers: Option<String>,
    group_id: Option<String>,
    auto_offset_reset: Option<String>,
    metadata_timeout: Option<Duration>,
}

impl RedpandaMessageSourceBuilder {
    /// Set the broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group.
    ///
    /// Default: `todo-system-consumers`
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Where a new consumer group starts reading: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Timeout for the topic existence check.
    ///
    /// Default: 10 seconds
    #[must_use]
    pub const fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaMessageSource`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the
    /// consumer cannot be created.
    pub fn build(self) -> Result<RedpandaMessageSource, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let group_id = self.group_id.unwrap_or_else(|| DEFAULT_GROUP_ID.to_string());
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create consumer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            group_id = %group_id,
            auto_offset_reset = %auto_offset_reset,
            manual_commit = true,
            "RedpandaMessageSource created"
        );

        Ok(RedpandaMessageSource {
            consumer: Arc::new(consumer),
            group_id,
            metadata_timeout: self.metadata_timeout.unwrap_or(DEFAULT_METADATA_TIMEOUT),
            closed: false,
        })
    }
}

/// Copy an rdkafka message into an owned [`ConsumedMessage`].
///
/// Keys are decoded as lossy UTF-8; headers without a value become empty.
fn to_consumed<M: Message>(message: &M) -> ConsumedMessage {
    let mut headers = MessageHeaders::new();
    if let Some(kafka_headers) = message.headers() {
        for header in kafka_headers.iter() {
            headers.insert(header.key, header.value.unwrap_or_default());
        }
    }

    ConsumedMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec),
        headers,
    }
}

impl MessageSource for RedpandaMessageSource {
    fn topic_exists(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EventBusError>> + Send + '_>> {
        let consumer = Arc::clone(&self.consumer);
        let topic = topic.to_string();
        let timeout = self.metadata_timeout;

        Box::pin(async move {
            // Listing all topics avoids triggering auto-creation of `topic`
            tokio::task::spawn_blocking(move || {
                consumer.fetch_metadata(None, timeout).map(|metadata| {
                    metadata
                        .topics()
                        .iter()
                        .any(|t| t.name() == topic && t.error().is_none())
                })
            })
            .await
            .map_err(|e| EventBusError::ConnectionFailed(e.to_string()))?
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to fetch metadata: {e}")))
        })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), EventBusError> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| EventBusError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(topic, group_id = %self.group_id, "Subscribed to topic");
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConsumedMessage>, EventBusError>> + Send + '_>>
    {
        Box::pin(async move {
            if self.closed {
                return Err(EventBusError::Closed);
            }

            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_) => Ok(None),
                Ok(Ok(message)) => {
                    tracing::trace!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );
                    Ok(Some(to_consumed(&message)))
                }
                Ok(Err(e)) => Err(EventBusError::TransportError(format!(
                    "Failed to receive message: {e}"
                ))),
            }
        })
    }

    fn commit(&mut self, message: &ConsumedMessage) -> Result<(), EventBusError> {
        // The committed offset is the next one to read
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| EventBusError::CommitFailed(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| EventBusError::CommitFailed(e.to_string()))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.consumer.unsubscribe();
        tracing::info!(group_id = %self.group_id, "Kafka consumer closed");
    }
}
