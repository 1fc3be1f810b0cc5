//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for every pipeline component:
//! - Cache hits, misses and invalidations
//! - Transport attempts, retries and exhaustion
//! - Event publication
//! - Message consumption and processor failures
//!
//! Recording is always safe: without an installed recorder the `metrics` macros
//! are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use todo_sync_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics exporter.
///
/// Installs the global recorder and serves metrics over HTTP for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built (e.g. the address cannot be bound).
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), a warning is logged
    /// and the call succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            // ExporterError has no Display or Debug impl
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Cache
    describe_counter!("cache_hits_total", "Reads served from the cache");
    describe_counter!("cache_misses_total", "Reads that fell through to the provider");
    describe_counter!(
        "cache_invalidations_total",
        "Cache entries removed after a successful write"
    );
    describe_counter!("cache_expired_purged_total", "Expired entries removed by a sweep");

    // Transport / retry
    describe_counter!("retry_attempts_total", "Outbound attempts, first attempts included");
    describe_counter!(
        "retry_successes_total",
        "Operations that succeeded after at least one retry"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Operations that failed after exhausting their retries"
    );

    // Event bus
    describe_counter!(
        "event_bus_messages_published_total",
        "Total number of messages published to event bus"
    );
    describe_counter!(
        "event_bus_publish_errors_total",
        "Total number of publish errors"
    );
    describe_histogram!(
        "event_bus_publish_duration_seconds",
        "Time taken to publish messages"
    );

    // Consumer
    describe_counter!(
        "event_bus_messages_consumed_total",
        "Total number of messages consumed from event bus"
    );
    describe_counter!(
        "event_bus_consume_errors_total",
        "Total number of poll or commit errors"
    );
    describe_counter!(
        "processor_failures_total",
        "Messages whose processor returned an error or panicked"
    );
}

/// Cache metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a cache hit.
    pub fn record_hit() {
        counter!("cache_hits_total").increment(1);
    }

    /// Record a cache miss.
    pub fn record_miss() {
        counter!("cache_misses_total").increment(1);
    }

    /// Record removed entries after a write.
    pub fn record_invalidation(removed: usize) {
        counter!("cache_invalidations_total").increment(removed as u64);
    }

    /// Record entries removed by an expiry sweep.
    pub fn record_purge(removed: usize) {
        counter!("cache_expired_purged_total").increment(removed as u64);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record an attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

/// Event bus metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record a message publish.
    pub fn record_publish(duration: Duration) {
        counter!("event_bus_messages_published_total").increment(1);
        histogram!("event_bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish error.
    pub fn record_publish_error() {
        counter!("event_bus_publish_errors_total").increment(1);
    }

    /// Record a message consumption.
    pub fn record_consume() {
        counter!("event_bus_messages_consumed_total").increment(1);
    }

    /// Record a poll or commit error.
    pub fn record_consume_error() {
        counter!("event_bus_consume_errors_total").increment(1);
    }

    /// Record a processor failure.
    pub fn record_processor_failure() {
        counter!("processor_failures_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if the address does not parse
mod tests {
    use super::*;

    #[test]
    fn recorders_are_safe_without_an_installed_exporter() {
        CacheMetrics::record_hit();
        CacheMetrics::record_miss();
        CacheMetrics::record_invalidation(2);
        RetryMetrics::record_exhausted();
        EventBusMetrics::record_publish(Duration::from_millis(5));
        EventBusMetrics::record_processor_failure();
    }

    #[test]
    fn server_has_nothing_to_render_before_start() {
        let server = MetricsServer::new("127.0.0.1:0".parse().expect("valid address"));
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn started_server_exports_recorded_metrics() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().expect("valid address"));
        server.start().expect("exporter should start");

        CacheMetrics::record_hit();

        // Only the first installer in this process gets a handle
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("cache_hits_total"));
        }
    }
}
