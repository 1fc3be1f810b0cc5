//! [`EventPublisher`] over a shared [`EventBus`].
//!
//! The publisher frames each [`ExternalTodoCreatedEvent`] as a broker message
//! (key = event id, JSON value, `eventType`/`correlationId`/`source` headers)
//! and sends it to one configured topic. Delivery guarantees come from the bus:
//! the Redpanda bus is an idempotent producer waiting for all replicas.
//!
//! # Shutdown
//!
//! [`BusEventPublisher::shutdown`] flushes in-flight sends with a bounded wait
//! and marks the publisher closed. It may be called any number of times; only
//! the first call flushes.

use crate::metrics::EventBusMetrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use todo_sync_core::{
    CancellationToken, EventBus, EventBusError, EventPublisher, ExternalTodoCreatedEvent,
    PublishError,
};

/// Default bound on the shutdown flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes external todo events to a single topic.
pub struct BusEventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    flush_timeout: Duration,
    closed: AtomicBool,
}

impl BusEventPublisher {
    /// Publish to `topic` through `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    /// Override the shutdown flush bound.
    #[must_use]
    pub const fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Topic events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flush in-flight sends and stop accepting new ones.
    ///
    /// Idempotent: later calls return `Ok(())` without touching the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::FlushFailed`] if messages were still undelivered
    /// when the flush bound elapsed. The publisher is closed regardless.
    pub async fn shutdown(&self) -> Result<(), EventBusError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(topic = %self.topic, "Publisher already shut down");
            return Ok(());
        }

        tracing::info!(
            topic = %self.topic,
            timeout_ms = u64::try_from(self.flush_timeout.as_millis()).unwrap_or(u64::MAX),
            "Flushing event publisher"
        );

        match self.bus.flush(self.flush_timeout).await {
            Ok(()) => {
                tracing::info!(topic = %self.topic, "Event publisher shut down");
                Ok(())
            }
            Err(e) => {
                tracing::error!(topic = %self.topic, error = %e, "Flush did not complete before shutdown");
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        event: &ExternalTodoCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), PublishError> {
        let event_id = event.id().to_string();

        if self.is_closed() {
            return Err(PublishError::Closed { event_id });
        }
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled { event_id });
        }

        let message = event.to_message().map_err(|e| PublishError::Encoding {
            event_id: event_id.clone(),
            reason: e.to_string(),
        })?;

        let started = Instant::now();
        match self.bus.publish(&self.topic, &message).await {
            Ok(()) => {
                EventBusMetrics::record_publish(started.elapsed());
                tracing::info!(
                    event_id = %event_id,
                    correlation_id = %event.correlation_id(),
                    topic = %self.topic,
                    "Published {}",
                    event.event_type()
                );
                Ok(())
            }
            Err(source) => {
                EventBusMetrics::record_publish_error();
                Err(PublishError::Broker { event_id, source })
            }
        }
    }
}

impl EventPublisher for BusEventPublisher {
    fn publish_external_todo_created<'a>(
        &'a self,
        event: &'a ExternalTodoCreatedEvent,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(self.publish(event, cancel))
    }
}
