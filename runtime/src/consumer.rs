//! Background consumer that feeds broker messages to a [`MessageProcessor`].
//!
//! # State machine
//!
//! ```text
//! Idle ──► Subscribed ──► Polling ◄──► Dispatching
//!   │                        │
//!   │ (topic missing)        │ (cancelled)
//!   ▼                        ▼
//! Closed ◄─────────────── Closing
//! ```
//!
//! The current state is published on a watch channel (see [`ConsumerHandle`]).
//!
//! # Delivery
//!
//! Each polled message is dispatched to the processor and awaited before the
//! next poll. Processor errors and panics are logged with the raw payload and
//! never stop the loop. The offset is committed after dispatch whatever the
//! outcome, so a crash between dispatch and commit redelivers the message
//! (at-least-once).

use crate::metrics::EventBusMetrics;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use todo_sync_core::{
    CancellationToken, ConsumedMessage, MessageProcessor, MessageSource, ProcessorError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default wait for a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after a failed poll before polling again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of an [`EventConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, not yet subscribed
    Idle,
    /// Subscribed to the topic
    Subscribed,
    /// Waiting for the next message
    Polling,
    /// Handing a message to the processor
    Dispatching,
    /// Leaving the subscription
    Closing,
    /// Stopped; the subscription is released
    Closed,
}

/// Single long-lived consumer of one topic.
pub struct EventConsumer {
    source: Box<dyn MessageSource>,
    processor: Arc<dyn MessageProcessor>,
    topic: String,
    poll_timeout: Duration,
    error_backoff: Duration,
}

impl EventConsumer {
    /// Consume `topic` from `source`, dispatching to `processor`.
    #[must_use]
    pub fn new(
        source: Box<dyn MessageSource>,
        processor: Arc<dyn MessageProcessor>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            source,
            processor,
            topic: topic.into(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Override the per-poll wait.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Override the pause after a failed poll.
    #[must_use]
    pub const fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run the consumer on its own task until `cancel` fires.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> ConsumerHandle {
        let (state_tx, state_rx) = watch::channel(ConsumerState::Idle);
        let join = tokio::spawn(self.run(cancel, state_tx));
        ConsumerHandle {
            join,
            state: state_rx,
        }
    }

    /// Run the consumer on the current task until `cancel` fires.
    ///
    /// State transitions are sent on `state`; a dropped receiver is ignored.
    pub async fn run(mut self, cancel: CancellationToken, state: watch::Sender<ConsumerState>) {
        let topic = self.topic.clone();
        tracing::info!(topic = %topic, "Starting event consumer");

        if !self.subscribe(&state).await {
            self.source.close();
            state.send_replace(ConsumerState::Closed);
            return;
        }

        while !cancel.is_cancelled() {
            state.send_replace(ConsumerState::Polling);

            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    state.send_replace(ConsumerState::Dispatching);
                    EventBusMetrics::record_consume();
                    Self::dispatch(Arc::clone(&self.processor), &message).await;
                    self.commit(&message);
                }
                Ok(None) => {}
                Err(e) => {
                    EventBusMetrics::record_consume_error();
                    tracing::error!(topic = %topic, error = %e, "Error receiving message from broker");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(topic = %topic, "Shutdown signal received, closing consumer");
        state.send_replace(ConsumerState::Closing);
        self.source.close();
        state.send_replace(ConsumerState::Closed);
        tracing::info!(topic = %topic, "Event consumer stopped");
    }

    async fn subscribe(&mut self, state: &watch::Sender<ConsumerState>) -> bool {
        match self.source.topic_exists(&self.topic).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(topic = %self.topic, "Topic does not exist, consumer not started");
                return false;
            }
            Err(e) => {
                tracing::error!(topic = %self.topic, error = %e, "Failed to check topic existence");
                return false;
            }
        }

        if let Err(e) = self.source.subscribe(&self.topic) {
            tracing::error!(topic = %self.topic, error = %e, "Failed to subscribe");
            return false;
        }

        state.send_replace(ConsumerState::Subscribed);
        tracing::info!(topic = %self.topic, "Subscribed");
        true
    }

    async fn dispatch(processor: Arc<dyn MessageProcessor>, message: &ConsumedMessage) {
        let outcome = AssertUnwindSafe(processor.process(message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProcessorError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => tracing::debug!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Message processed"
            ),
            Err(e) => {
                EventBusMetrics::record_processor_failure();
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    key = message.key.as_deref().unwrap_or_default(),
                    payload = %message.payload_text(),
                    error = %e,
                    "Failed to process message"
                );
            }
        }
    }

    fn commit(&mut self, message: &ConsumedMessage) {
        if let Err(e) = self.source.commit(message) {
            EventBusMetrics::record_consume_error();
            tracing::warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset, message may be redelivered"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Handle to a consumer running on its own task.
pub struct ConsumerHandle {
    join: JoinHandle<()>,
    state: watch::Receiver<ConsumerState>,
}

impl ConsumerHandle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// A receiver for observing state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Wait until the consumer reaches `target`, or stops first.
    pub async fn wait_for(&mut self, target: ConsumerState) -> ConsumerState {
        match self
            .state
            .wait_for(|s| *s == target || *s == ConsumerState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => ConsumerState::Closed,
        }
    }

    /// Wait for the consumer task to finish.
    ///
    /// # Errors
    ///
    /// Returns the join error if the task itself panicked or was aborted.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)] // Panics: Test will fail if the consumer misbehaves
mod tests {
    use super::*;
    use todo_sync_testing::{InMemoryMessageSource, RecordingProcessor};

    fn message(offset: i64, payload: &str) -> ConsumedMessage {
        InMemoryMessageSource::message("t", offset, payload)
    }

    #[tokio::test]
    async fn missing_topic_closes_without_subscribing() {
        let source = InMemoryMessageSource::new();
        let probe = source.probe();
        let processor = Arc::new(RecordingProcessor::new());

        let handle = EventConsumer::new(Box::new(source), processor, "missing")
            .spawn(CancellationToken::new());
        let state = handle.subscribe_state();
        handle.join().await.expect("consumer task");

        assert_eq!(*state.borrow(), ConsumerState::Closed);
        assert!(probe.subscriptions().is_empty());
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn processor_panic_does_not_stop_the_loop() {
        let source = InMemoryMessageSource::with_topic("t");
        let probe = source.probe();
        probe.push(message(0, "first"));
        probe.push(message(1, "boom"));
        probe.push(message(2, "third"));

        let processor = Arc::new(RecordingProcessor::new().panic_on_payload("boom"));
        let cancel = CancellationToken::new();
        let handle = EventConsumer::new(Box::new(source), processor.clone(), "t")
            .with_poll_timeout(Duration::from_millis(10))
            .spawn(cancel.clone());

        processor.wait_for_attempts(3).await;
        cancel.cancel();
        handle.join().await.expect("consumer task");

        assert_eq!(processor.payloads(), vec!["first", "third"]);
        assert_eq!(probe.committed_offsets(), vec![0, 1, 2]);
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn cancellation_interrupts_an_idle_poll() {
        let source = InMemoryMessageSource::with_topic("t");
        let probe = source.probe();
        let cancel = CancellationToken::new();
        let mut handle = EventConsumer::new(Box::new(source), Arc::new(RecordingProcessor::new()), "t")
            .with_poll_timeout(Duration::from_secs(3600))
            .spawn(cancel.clone());

        assert_eq!(handle.wait_for(ConsumerState::Polling).await, ConsumerState::Polling);
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("consumer should stop promptly")
            .expect("consumer task");
        assert!(probe.is_closed());
    }

    #[test]
    fn run_future_can_move_to_another_task() {
        fn assert_send<T: Send>(_: &T) {}

        let consumer = EventConsumer::new(
            Box::new(InMemoryMessageSource::with_topic("t")),
            Arc::new(RecordingProcessor::new()),
            "t",
        );
        let (state, _observer) = watch::channel(ConsumerState::Idle);
        let run = consumer.run(CancellationToken::new(), state);

        assert_send(&run);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
