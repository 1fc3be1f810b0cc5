//! Built-in [`MessageProcessor`]s.
//!
//! - [`LoggingMessageProcessor`]: logs every message payload
//! - [`ExternalTodoCreatedProcessor`]: decodes `ExternalTodoCreated` events and
//!   hands them to an [`ExternalTodoCreatedHandler`]
//! - [`LoggingCreatedHandler`]: the default handler, logs each created todo
//! - [`DeduplicatingProcessor`]: skips messages whose key was already handled
//!   within a bounded window

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use todo_sync_core::event::headers;
use todo_sync_core::{ConsumedMessage, ExternalTodoCreatedEvent, MessageProcessor, ProcessorError};
use tokio::sync::Mutex;

type ProcessFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProcessorError>> + Send + 'a>>;

/// Logs each message at info level and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessageProcessor;

impl MessageProcessor for LoggingMessageProcessor {
    fn process<'a>(&'a self, message: &'a ConsumedMessage) -> ProcessFuture<'a> {
        Box::pin(async move {
            tracing::info!(
                topic = %message.topic,
                offset = message.offset,
                event_type = message.headers.get_str(headers::EVENT_TYPE).unwrap_or_default(),
                correlation_id = message.headers.get_str(headers::CORRELATION_ID).unwrap_or_default(),
                "Message processed: {}",
                message.payload_text()
            );
            Ok(())
        })
    }
}

/// Reaction to a decoded [`ExternalTodoCreatedEvent`].
pub trait ExternalTodoCreatedHandler: Send + Sync {
    /// Handle one event. May be called more than once for the same event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Handler`] if the event could not be handled.
    fn handle<'a>(&'a self, event: &'a ExternalTodoCreatedEvent) -> ProcessFuture<'a>;
}

impl<H: ExternalTodoCreatedHandler + ?Sized> ExternalTodoCreatedHandler for Arc<H> {
    fn handle<'a>(&'a self, event: &'a ExternalTodoCreatedEvent) -> ProcessFuture<'a> {
        (**self).handle(event)
    }
}

/// Logs each created todo at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCreatedHandler;

impl ExternalTodoCreatedHandler for LoggingCreatedHandler {
    fn handle<'a>(&'a self, event: &'a ExternalTodoCreatedEvent) -> ProcessFuture<'a> {
        Box::pin(async move {
            tracing::info!(
                event_id = %event.id(),
                correlation_id = %event.correlation_id(),
                source = %event.source(),
                created_at = %event.created_at(),
                title = %event.title(),
                "External todo created"
            );
            Ok(())
        })
    }
}

/// Decodes `ExternalTodoCreated` messages and forwards them to a handler.
///
/// Messages whose `eventType` header names another event are skipped without
/// decoding. A payload whose correlation id disagrees with its header is
/// rejected as undecodable.
pub struct ExternalTodoCreatedProcessor<H> {
    handler: H,
}

impl<H: ExternalTodoCreatedHandler> ExternalTodoCreatedProcessor<H> {
    /// Forward decoded events to `handler`.
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self { handler }
    }

    fn decode(message: &ConsumedMessage) -> Result<ExternalTodoCreatedEvent, ProcessorError> {
        let event = ExternalTodoCreatedEvent::from_message(message)
            .map_err(|e| ProcessorError::Decode(e.to_string()))?;

        if let Some(header) = message.headers.get_str(headers::CORRELATION_ID) {
            if header != event.correlation_id().as_str() {
                return Err(ProcessorError::Decode(format!(
                    "correlationId header '{header}' does not match payload '{}'",
                    event.correlation_id()
                )));
            }
        }

        Ok(event)
    }
}

impl<H: ExternalTodoCreatedHandler> MessageProcessor for ExternalTodoCreatedProcessor<H> {
    fn process<'a>(&'a self, message: &'a ConsumedMessage) -> ProcessFuture<'a> {
        Box::pin(async move {
            if let Some(event_type) = message.headers.get_str(headers::EVENT_TYPE) {
                if event_type != ExternalTodoCreatedEvent::EVENT_TYPE {
                    tracing::debug!(event_type, offset = message.offset, "Skipping unrelated event");
                    return Ok(());
                }
            }

            let event = Self::decode(message)?;
            tracing::debug!(
                event_id = %event.id(),
                correlation_id = %event.correlation_id(),
                "Handling {}",
                event.event_type()
            );
            self.handler.handle(&event).await
        })
    }
}

/// Default number of remembered message keys.
pub const DEFAULT_DEDUP_WINDOW: usize = 10_000;

/// Skips messages whose key was already processed successfully.
///
/// The key is the broker message key (the event id), falling back to the
/// `correlationId` header. Keyless messages always pass through. Only the most
/// recent `window` keys are remembered; a failed message is not remembered, so
/// a redelivery gets another chance.
pub struct DeduplicatingProcessor {
    inner: Arc<dyn MessageProcessor>,
    window: usize,
    seen: Mutex<SeenKeys>,
}

#[derive(Default)]
struct SeenKeys {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenKeys {
    fn remember(&mut self, key: String, window: usize) {
        if window == 0 || !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > window {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }
}

impl DeduplicatingProcessor {
    /// Wrap `inner` with a [`DEFAULT_DEDUP_WINDOW`]-sized window.
    #[must_use]
    pub fn new(inner: Arc<dyn MessageProcessor>) -> Self {
        Self::with_window(inner, DEFAULT_DEDUP_WINDOW)
    }

    /// Wrap `inner`, remembering at most `window` keys.
    #[must_use]
    pub fn with_window(inner: Arc<dyn MessageProcessor>, window: usize) -> Self {
        Self {
            inner,
            window,
            seen: Mutex::new(SeenKeys::default()),
        }
    }

    fn key_of(message: &ConsumedMessage) -> Option<String> {
        message
            .key
            .clone()
            .or_else(|| message.headers.get_str(headers::CORRELATION_ID).map(str::to_string))
    }
}

impl MessageProcessor for DeduplicatingProcessor {
    fn process<'a>(&'a self, message: &'a ConsumedMessage) -> ProcessFuture<'a> {
        Box::pin(async move {
            let Some(key) = Self::key_of(message) else {
                return self.inner.process(message).await;
            };

            if self.seen.lock().await.keys.contains(&key) {
                tracing::info!(key = %key, offset = message.offset, "Skipping duplicate message");
                return Ok(());
            }

            self.inner.process(message).await?;
            self.seen.lock().await.remember(key, self.window);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if processing errors unexpectedly
mod tests {
    use super::*;
    use todo_sync_core::{CorrelationId, Utc};
    use todo_sync_testing::{InMemoryMessageSource, RecordingProcessor};

    #[derive(Default)]
    struct CollectingHandler {
        events: std::sync::Mutex<Vec<ExternalTodoCreatedEvent>>,
    }

    impl ExternalTodoCreatedHandler for CollectingHandler {
        fn handle<'a>(&'a self, event: &'a ExternalTodoCreatedEvent) -> ProcessFuture<'a> {
            Box::pin(async move {
                self.events
                    .lock()
                    .map_err(|e| ProcessorError::Handler(e.to_string()))?
                    .push(event.clone());
                Ok(())
            })
        }
    }

    fn event_message(offset: i64) -> ConsumedMessage {
        let event = ExternalTodoCreatedEvent::new(
            "evt-1",
            "Title",
            CorrelationId::from("corr-1"),
            "JSONPlaceholder",
            Utc::now(),
        );
        let framed = event.to_message().expect("encode");
        ConsumedMessage {
            topic: "t".to_string(),
            partition: 0,
            offset,
            key: Some(framed.key),
            payload: Some(framed.payload),
            headers: framed.headers,
        }
    }

    #[tokio::test]
    async fn decodes_and_forwards_created_events() {
        let handler = Arc::new(CollectingHandler::default());
        let processor = ExternalTodoCreatedProcessor::new(Arc::clone(&handler));

        processor.process(&event_message(0)).await.expect("process");

        let events = handler.events.lock().expect("lock");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id(), "evt-1");
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_decode_error() {
        let processor = ExternalTodoCreatedProcessor::new(Arc::new(CollectingHandler::default()));
        let message = InMemoryMessageSource::message("t", 0, "not json");

        let err = processor.process(&message).await.expect_err("should fail");
        assert!(matches!(err, ProcessorError::Decode(_)));
    }

    #[tokio::test]
    async fn mismatched_correlation_header_is_rejected() {
        let processor = ExternalTodoCreatedProcessor::new(Arc::new(CollectingHandler::default()));
        let mut message = event_message(0);
        message.headers = todo_sync_core::MessageHeaders::new();
        message.headers.insert(headers::CORRELATION_ID, "other");

        let err = processor.process(&message).await.expect_err("should fail");
        assert!(matches!(err, ProcessorError::Decode(_)));
    }

    #[tokio::test]
    async fn unrelated_event_types_are_skipped() {
        let handler = Arc::new(CollectingHandler::default());
        let processor = ExternalTodoCreatedProcessor::new(Arc::clone(&handler));
        let mut message = InMemoryMessageSource::message("t", 0, "not json either");
        message.headers.insert(headers::EVENT_TYPE, "SomethingElse");

        processor.process(&message).await.expect("skipped");
        assert!(handler.events.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn duplicates_are_processed_once() {
        let inner = Arc::new(RecordingProcessor::new());
        let processor = DeduplicatingProcessor::new(inner.clone());

        processor.process(&event_message(0)).await.expect("first");
        processor.process(&event_message(1)).await.expect("redelivery");

        assert_eq!(inner.attempts(), 1);
    }

    #[tokio::test]
    async fn failed_messages_are_not_remembered() {
        let inner = Arc::new(RecordingProcessor::new().fail_on_payload("flaky"));
        let processor = DeduplicatingProcessor::new(inner.clone());
        let mut message = InMemoryMessageSource::message("t", 0, "flaky");
        message.key = Some("k".to_string());

        assert!(processor.process(&message).await.is_err());
        assert!(processor.process(&message).await.is_err());
        assert_eq!(inner.attempts(), 2);
    }

    #[test]
    fn window_evicts_oldest_keys() {
        let mut seen = SeenKeys::default();
        for key in ["a", "b", "c"] {
            seen.remember(key.to_string(), 2);
        }

        assert!(!seen.keys.contains("a"));
        assert!(seen.keys.contains("b"));
        assert!(seen.keys.contains("c"));
        assert_eq!(seen.order.len(), 2);
    }
}
