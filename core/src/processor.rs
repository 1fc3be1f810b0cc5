//! Handling of consumed broker messages.

use crate::event_bus::ConsumedMessage;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Failure while handling a single consumed message.
///
/// The consumer logs the error together with the raw payload and moves on to
/// the next message; a processor error never stops the consume loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The payload could not be decoded into the expected event.
    #[error("Failed to decode message: {0}")]
    Decode(String),

    /// The downstream handler rejected the message.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The processor panicked while handling the message.
    #[error("Processor panicked: {0}")]
    Panicked(String),
}

/// Business logic invoked once per consumed message.
///
/// Delivery is at-least-once, so implementations must tolerate seeing the same
/// message more than once.
pub trait MessageProcessor: Send + Sync {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] if the message could not be handled.
    fn process<'a>(
        &'a self,
        message: &'a ConsumedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessorError>> + Send + 'a>>;
}

impl<P: MessageProcessor + ?Sized> MessageProcessor for Arc<P> {
    fn process<'a>(
        &'a self,
        message: &'a ConsumedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessorError>> + Send + 'a>> {
        (**self).process(message)
    }
}
