//! # Todo Sync Runtime
//!
//! Runtime building blocks for the external todo synchronization pipeline.
//!
//! ## Core Components
//!
//! - **Retry**: exponential backoff for transient failures ([`retry`])
//! - **Cache**: an in-process [`CacheStore`](todo_sync_core::CacheStore) and the
//!   cache-aside decorator ([`cache`], [`caching`])
//! - **Tracing**: the outermost logging decorator ([`tracing_service`])
//! - **Publishing**: events to an [`EventBus`](todo_sync_core::EventBus) ([`publishing`])
//! - **Commands**: create-and-announce and update-by-id ([`commands`])
//! - **Consumer**: the background poll loop and built-in processors
//!   ([`consumer`], [`processors`])
//! - **Metrics**: Prometheus exporter and recorders ([`metrics`])
//!
//! ## Example
//!
//! ```ignore
//! use todo_sync_runtime::{
//!     CachingExternalTodoService, InMemoryCacheStore, TracingExternalTodoService,
//! };
//!
//! let cache = Arc::new(InMemoryCacheStore::new());
//! let service = TracingExternalTodoService::new(
//!     CachingExternalTodoService::new(client, cache).with_ttl(Duration::from_secs(300)),
//! );
//!
//! let todos = service.list(&CancellationToken::new()).await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// In-memory cache store
pub mod cache;

/// Cache-aside decorator
pub mod caching;

/// Logging decorator
pub mod tracing_service;

/// Event publisher over an event bus
pub mod publishing;

/// Create and update commands
pub mod commands;

/// Background event consumer
pub mod consumer;

/// Built-in message processors
pub mod processors;

pub use cache::InMemoryCacheStore;
pub use caching::CachingExternalTodoService;
pub use commands::{CommandError, CreateOutcome, ExternalTodoCommands, UpdateOutcome};
pub use consumer::{ConsumerHandle, ConsumerState, EventConsumer};
pub use processors::{
    DeduplicatingProcessor, ExternalTodoCreatedHandler, ExternalTodoCreatedProcessor,
    LoggingCreatedHandler, LoggingMessageProcessor,
};
pub use publishing::BusEventPublisher;
pub use retry::{RetryPolicy, RetryState, retry_with_predicate};
pub use tracing_service::TracingExternalTodoService;
