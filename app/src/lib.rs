//! # Todo Sync Application
//!
//! Composition root for the external todo pipeline. Builds the decorator chain
//! (tracing → cache-aside → HTTP client → resilient transport), the Kafka
//! publisher and the commands on top of them, and the consumer for the
//! `ExternalTodoCreated` topic.
//!
//! ## Example
//!
//! ```no_run
//! use todo_sync_app::{Config, TodoSyncApp};
//! use todo_sync_core::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = TodoSyncApp::new(Config::from_env())?;
//! let outcome = app.commands().create("Water the plants", &CancellationToken::new()).await?;
//! println!("{outcome:?}");
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use config::{Config, ExternalTodosConfig, KafkaConfig};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use todo_sync_core::environment::{IdGenerator, SystemClock, UuidIdGenerator};
use todo_sync_core::{
    CacheStore, CancellationToken, EventBus, EventBusError, ExternalTodoService,
};
use todo_sync_provider::{BuildError, JsonPlaceholderClient, ResilientTransport};
use todo_sync_redpanda::{RedpandaEventBus, RedpandaMessageSource};
use todo_sync_runtime::{
    BusEventPublisher, CachingExternalTodoService, DeduplicatingProcessor, EventConsumer,
    ExternalTodoCommands, ExternalTodoCreatedProcessor, InMemoryCacheStore, LoggingCreatedHandler,
    RetryPolicy, TracingExternalTodoService,
};

/// Failure to assemble the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// The HTTP side could not be built.
    #[error("Provider setup failed: {0}")]
    Provider(#[from] BuildError),

    /// The broker side could not be built or flushed.
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),
}

/// Build the external todo service chain from configuration.
///
/// The chain is `Tracing(Caching(Client(Transport)))`, or `Tracing(Client(Transport))`
/// when caching is disabled.
///
/// # Errors
///
/// Returns [`BuildError`] if the base URL is invalid or the HTTP client cannot be built.
pub fn build_service(
    config: &ExternalTodosConfig,
    ids: Arc<dyn IdGenerator>,
) -> Result<Arc<dyn ExternalTodoService>, BuildError> {
    let policy = RetryPolicy::builder()
        .max_retries(config.retry_count)
        .base_delay(config.retry_base_delay())
        .build();

    let transport = ResilientTransport::builder(config.base_url.as_str())
        .attempt_timeout(config.attempt_timeout())
        .retry_policy(policy)
        .user_agent(config.user_agent.as_str())
        .build()?;
    let client = JsonPlaceholderClient::new(transport, ids).with_owner_id(config.owner_id);

    if config.cache_enabled {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let caching = CachingExternalTodoService::new(client, cache).with_ttl(config.cache_ttl());
        tracing::info!(ttl_secs = config.cache_ttl_secs, "External todo cache enabled");
        Ok(Arc::new(TracingExternalTodoService::new(caching)))
    } else {
        tracing::info!("External todo cache disabled");
        Ok(Arc::new(TracingExternalTodoService::new(client)))
    }
}

/// Cancel `cancel` once `signal` resolves successfully.
///
/// The binary passes `tokio::signal::ctrl_c()` so an interrupt reaches every
/// in-flight operation through its token. A failed signal listener is logged
/// and leaves the token alone.
pub fn cancel_on_signal<F>(signal: F, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                tracing::info!("Interrupt received, cancelling in-flight work");
                cancel.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt"),
        }
    })
}

/// The assembled application.
pub struct TodoSyncApp {
    config: Config,
    service: Arc<dyn ExternalTodoService>,
    publisher: Arc<BusEventPublisher>,
    commands: ExternalTodoCommands,
}

impl TodoSyncApp {
    /// Assemble the service chain, publisher and commands.
    ///
    /// Connections are established lazily; no request is made here.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the HTTP client or the Kafka producer cannot be built.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidIdGenerator);
        let service = build_service(&config.external_todos, Arc::clone(&ids))?;

        let bus: Arc<dyn EventBus> = Arc::new(
            RedpandaEventBus::builder()
                .brokers(config.kafka.brokers.as_str())
                .message_timeout(config.kafka.message_timeout())
                .build()?,
        );
        let publisher = Arc::new(
            BusEventPublisher::new(bus, config.kafka.external_todo_topic.as_str())
                .with_flush_timeout(config.kafka.flush_timeout()),
        );

        let commands = ExternalTodoCommands::new(
            Arc::clone(&service),
            publisher.clone(),
            Arc::new(SystemClock),
            ids,
        )
        .with_source(config.event_source.as_str());

        tracing::info!(
            base_url = %config.external_todos.base_url,
            brokers = %config.kafka.brokers,
            topic = %config.kafka.external_todo_topic,
            "Application assembled"
        );

        Ok(Self {
            config,
            service,
            publisher,
            commands,
        })
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The outermost layer of the service chain.
    #[must_use]
    pub fn service(&self) -> &dyn ExternalTodoService {
        self.service.as_ref()
    }

    /// Create and update commands.
    #[must_use]
    pub const fn commands(&self) -> &ExternalTodoCommands {
        &self.commands
    }

    /// Build a consumer of the external todo topic that logs each created todo.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventBus`] if the Kafka consumer cannot be created.
    pub fn consumer(&self) -> Result<EventConsumer, AppError> {
        let kafka = &self.config.kafka;
        let source = RedpandaMessageSource::builder()
            .brokers(kafka.brokers.as_str())
            .group_id(kafka.consumer_group.as_str())
            .auto_offset_reset(kafka.auto_offset_reset.as_str())
            .build()?;

        let processor = DeduplicatingProcessor::new(Arc::new(ExternalTodoCreatedProcessor::new(
            LoggingCreatedHandler,
        )));

        Ok(EventConsumer::new(
            Box::new(source),
            Arc::new(processor),
            kafka.external_todo_topic.as_str(),
        )
        .with_poll_timeout(kafka.poll_timeout()))
    }

    /// Flush pending events and close the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventBus`] if undelivered events remained when the
    /// flush bound elapsed.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.publisher.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if the watcher misbehaves
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn interrupt_cancels_the_token() {
        let cancel = CancellationToken::new();
        let (interrupt, signal) = oneshot::channel::<()>();
        let watcher = cancel_on_signal(
            async move { signal.await.map_err(std::io::Error::other) },
            cancel.clone(),
        );
        assert!(!cancel.is_cancelled());

        interrupt.send(()).expect("watcher is listening");

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .expect("token should be cancelled");
        watcher.await.expect("watcher task");
    }

    #[tokio::test]
    async fn failed_listener_leaves_the_token_alone() {
        let cancel = CancellationToken::new();

        cancel_on_signal(
            async { Err(std::io::Error::other("no signal handler")) },
            cancel.clone(),
        )
        .await
        .expect("watcher task");

        assert!(!cancel.is_cancelled());
    }
}
