//! In-memory broker doubles and a recording processor.
//!
//! - [`InMemoryEventBus`]: records published messages per topic, can fail on demand
//! - [`InMemoryMessageSource`]: a queue fed through its [`SourceProbe`]
//! - [`RecordingProcessor`]: records payloads, can fail or panic on chosen payloads

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical
#![allow(clippy::panic)] // RecordingProcessor panics on purpose to exercise panic isolation

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use todo_sync_core::{
    ConsumedMessage, EventBus, EventBusError, EventMessage, MessageHeaders, MessageProcessor,
    MessageSource, ProcessorError,
};
use tokio::sync::{Notify, watch};

/// Event bus that keeps every published message in memory.
///
/// # Example
///
/// ```
/// use todo_sync_testing::InMemoryEventBus;
/// use todo_sync_core::{EventBus, EventMessage, MessageHeaders};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let message = EventMessage {
///     key: "k".to_string(),
///     payload: b"{}".to_vec(),
///     headers: MessageHeaders::new(),
/// };
/// bus.publish("topic", &message).await?;
/// assert_eq!(bus.published("topic").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    published: Mutex<Vec<(String, EventMessage)>>,
    failures_left: AtomicUsize,
    flushes: AtomicUsize,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publishes.
    pub fn fail_next_publishes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Messages published to `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<EventMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of `flush` calls.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        message: &EventMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let result = if self.take_failure() {
            Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            })
        } else {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.clone()));
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn flush(
        &self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

#[derive(Debug, Default)]
struct SourceState {
    topics: Mutex<HashSet<String>>,
    queue: Mutex<VecDeque<ConsumedMessage>>,
    arrived: Notify,
    subscriptions: Mutex<Vec<String>>,
    committed: Mutex<Vec<i64>>,
    poll_failures_left: AtomicUsize,
    closed: AtomicBool,
}

/// Message source backed by an in-memory queue.
///
/// The consumer owns the source; the test keeps a [`SourceProbe`] to feed
/// messages and observe commits.
#[derive(Debug, Default)]
pub struct InMemoryMessageSource {
    state: Arc<SourceState>,
}

impl InMemoryMessageSource {
    /// A source on a broker with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A source on a broker where `topic` exists.
    #[must_use]
    pub fn with_topic(topic: &str) -> Self {
        let source = Self::new();
        source.state.topics.lock().unwrap().insert(topic.to_string());
        source
    }

    /// A handle for feeding and observing this source.
    #[must_use]
    pub fn probe(&self) -> SourceProbe {
        SourceProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// A keyless partition-0 message with a text payload and no headers.
    #[must_use]
    pub fn message(topic: &str, offset: i64, payload: &str) -> ConsumedMessage {
        ConsumedMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: None,
            payload: Some(payload.as_bytes().to_vec()),
            headers: MessageHeaders::new(),
        }
    }
}

impl MessageSource for InMemoryMessageSource {
    fn topic_exists(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EventBusError>> + Send + '_>> {
        let exists = self.state.topics.lock().unwrap().contains(topic);
        Box::pin(async move { Ok(exists) })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), EventBusError> {
        self.state.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConsumedMessage>, EventBusError>> + Send + '_>>
    {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self
                    .state
                    .poll_failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(EventBusError::TransportError("injected poll failure".to_string()));
                }

                let next = self.state.queue.lock().unwrap().pop_front();
                if next.is_some() {
                    return Ok(next);
                }

                if tokio::time::timeout_at(deadline, self.state.arrived.notified())
                    .await
                    .is_err()
                {
                    return Ok(None);
                }
            }
        })
    }

    fn commit(&mut self, message: &ConsumedMessage) -> Result<(), EventBusError> {
        self.state.committed.lock().unwrap().push(message.offset);
        Ok(())
    }

    fn close(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Test-side handle to an [`InMemoryMessageSource`].
#[derive(Debug, Clone)]
pub struct SourceProbe {
    state: Arc<SourceState>,
}

impl SourceProbe {
    /// Enqueue a message and wake a waiting poll.
    pub fn push(&self, message: ConsumedMessage) {
        self.state.queue.lock().unwrap().push_back(message);
        self.state.arrived.notify_one();
    }

    /// Fail the next `count` polls.
    pub fn fail_next_polls(&self, count: usize) {
        self.state.poll_failures_left.store(count, Ordering::SeqCst);
    }

    /// Topics subscribed to so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    /// Offsets committed so far, in order.
    #[must_use]
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.state.committed.lock().unwrap().clone()
    }

    /// Whether the source was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

/// Processor that records payloads and fails or panics on request.
#[derive(Debug)]
pub struct RecordingProcessor {
    handled: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    attempts: watch::Sender<usize>,
}

impl RecordingProcessor {
    /// A processor that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handled: Mutex::new(Vec::new()),
            fail_on: HashSet::new(),
            panic_on: HashSet::new(),
            attempts: watch::Sender::new(0),
        }
    }

    /// Return [`ProcessorError::Handler`] for messages with this payload.
    #[must_use]
    pub fn fail_on_payload(mut self, payload: &str) -> Self {
        self.fail_on.insert(payload.to_string());
        self
    }

    /// Panic on messages with this payload.
    #[must_use]
    pub fn panic_on_payload(mut self, payload: &str) -> Self {
        self.panic_on.insert(payload.to_string());
        self
    }

    /// Payloads handled successfully, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<String> {
        self.handled.lock().unwrap().clone()
    }

    /// Number of `process` calls, failures included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.borrow()
    }

    /// Wait until at least `count` messages were attempted.
    pub async fn wait_for_attempts(&self, count: usize) {
        let mut attempts = self.attempts.subscribe();
        let _ = attempts.wait_for(|n| *n >= count).await;
    }
}

impl Default for RecordingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageProcessor for RecordingProcessor {
    fn process<'a>(
        &'a self,
        message: &'a ConsumedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessorError>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.send_modify(|n| *n += 1);
            let payload = message.payload_text();

            if self.panic_on.contains(&payload) {
                panic!("processor panicked on {payload}");
            }
            if self.fail_on.contains(&payload) {
                return Err(ProcessorError::Handler(format!("rejected {payload}")));
            }

            self.handled.lock().unwrap().push(payload);
            Ok(())
        })
    }
}
