//! # Todo Sync Core
//!
//! Core traits and types for the external todo synchronization pipeline.
//!
//! The pipeline mirrors personal todos into a third-party todo provider and
//! announces creations to other systems through a message broker:
//!
//! ```text
//! caller
//!   │
//!   ▼
//! ┌──────────────────────┐
//! │ Tracing decorator    │
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐     ┌──────────────┐
//! │ Cache-aside decorator│────►│  CacheStore  │
//! └──────────┬───────────┘     └──────────────┘
//!            ▼ (miss / write)
//! ┌──────────────────────┐
//! │ External todo client │
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Resilient transport  │────► third-party HTTP API
//! └──────────────────────┘
//!
//! create succeeded ──► EventPublisher ──► EventBus ──► MessageSource ──► MessageProcessor
//! ```
//!
//! This crate only defines the vocabulary. Implementations live in:
//!
//! - `todo-sync-runtime`: retry, caching, publishing, consumer loop
//! - `todo-sync-provider`: HTTP transport and provider client
//! - `todo-sync-redpanda`: Kafka-compatible broker adapters
//! - `todo-sync-testing`: deterministic test doubles
//!
//! ## Capability traits
//!
//! Every layer implements the same capability trait as the layer it wraps, so the
//! decorator chain is assembled explicitly at startup:
//!
//! ```ignore
//! let client = JsonPlaceholderClient::new(transport, ids);
//! let cached = CachingExternalTodoService::new(client, cache).with_ttl(Duration::from_secs(300));
//! let service = TracingExternalTodoService::new(cached);
//! ```
//!
//! All traits return `Pin<Box<dyn Future>>` so they can be used as trait objects
//! (`Arc<dyn ExternalTodoService>`), and every operation takes a
//! [`CancellationToken`] that the innermost network call observes.

pub mod cache;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod processor;
pub mod service;
pub mod todo;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use tokio_util::sync::CancellationToken;

pub use cache::{CacheEntry, CacheStore, keys};
pub use error::{CacheError, ExternalServiceError, TransportError};
pub use event::{CorrelationId, ExternalTodoCreatedEvent};
pub use event_bus::{
    ConsumedMessage, EventBus, EventBusError, EventMessage, EventPublisher, MessageHeaders,
    MessageSource, PublishError,
};
pub use processor::{MessageProcessor, ProcessorError};
pub use service::{ExternalTodoService, ServiceFuture};
pub use todo::{ProviderId, TodoRecord};

/// Environment module - Injected dependencies for time and identity
///
/// All non-deterministic inputs of the pipeline (wall-clock time and freshly
/// minted identifiers) are abstracted behind traits so tests can substitute
/// fixed or sequential implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use todo_sync_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of opaque local identifiers.
    ///
    /// Used for `TodoRecord::id` values and correlation ids.
    pub trait IdGenerator: Send + Sync {
        /// Mint a new, never-before-returned identifier.
        fn next_id(&self) -> String;
    }

    /// Production id generator producing random UUID v4 strings.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidIdGenerator;

    impl IdGenerator for UuidIdGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}
