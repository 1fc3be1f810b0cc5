//! Configuration management for the todo sync application.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to the default.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// External todo provider configuration
    pub external_todos: ExternalTodosConfig,
    /// Kafka/Redpanda configuration
    pub kafka: KafkaConfig,
    /// `source` field stamped on created events
    pub event_source: String,
    /// Prometheus exporter address; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

/// External todo provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalTodosConfig {
    /// Provider base URL
    pub base_url: String,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub retry_count: usize,
    /// Backoff base in milliseconds
    pub retry_base_delay_ms: u64,
    /// `userId` sent on create and update
    pub owner_id: i64,
    /// Outbound `User-Agent`
    pub user_agent: String,
    /// Wrap the client in the cache-aside decorator
    pub cache_enabled: bool,
    /// Cache time-to-live in seconds
    pub cache_ttl_secs: u64,
}

/// Kafka/Redpanda configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic for external todo events
    pub external_todo_topic: String,
    /// Consumer group
    pub consumer_group: String,
    /// Where a new group starts reading: earliest or latest
    pub auto_offset_reset: String,
    /// Producer delivery timeout in milliseconds
    pub message_timeout_ms: u64,
    /// Shutdown flush bound in seconds
    pub flush_timeout_secs: u64,
    /// Consumer poll timeout in milliseconds
    pub poll_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Falls back to sensible defaults for local development.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            external_todos: ExternalTodosConfig {
                base_url: string(
                    "EXTERNAL_TODOS_BASE_URL",
                    "https://jsonplaceholder.typicode.com/",
                ),
                timeout_secs: parse(&lookup, "EXTERNAL_TODOS_TIMEOUT_SECS").unwrap_or(10),
                retry_count: parse(&lookup, "EXTERNAL_TODOS_RETRY_COUNT").unwrap_or(3),
                retry_base_delay_ms: parse(&lookup, "EXTERNAL_TODOS_RETRY_BASE_DELAY_MS")
                    .unwrap_or(1000),
                owner_id: parse(&lookup, "EXTERNAL_TODOS_OWNER_ID").unwrap_or(1),
                user_agent: string("EXTERNAL_TODOS_USER_AGENT", "TodoSystem/1.0"),
                cache_enabled: parse(&lookup, "EXTERNAL_TODOS_CACHE_ENABLED").unwrap_or(true),
                cache_ttl_secs: parse(&lookup, "EXTERNAL_TODOS_CACHE_TTL_SECS").unwrap_or(300),
            },
            kafka: KafkaConfig {
                brokers: string("KAFKA_BROKERS", "localhost:9092"),
                external_todo_topic: string("KAFKA_EXTERNAL_TODO_TOPIC", "external-todos-created"),
                consumer_group: string("KAFKA_CONSUMER_GROUP", "todo-system-consumers"),
                auto_offset_reset: string("KAFKA_AUTO_OFFSET_RESET", "earliest"),
                message_timeout_ms: parse(&lookup, "KAFKA_MESSAGE_TIMEOUT_MS").unwrap_or(5000),
                flush_timeout_secs: parse(&lookup, "KAFKA_FLUSH_TIMEOUT_SECS").unwrap_or(10),
                poll_timeout_ms: parse(&lookup, "KAFKA_POLL_TIMEOUT_MS").unwrap_or(1000),
            },
            event_source: string("EVENT_SOURCE", "JSONPlaceholder"),
            metrics_addr: parse(&lookup, "METRICS_ADDR"),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl ExternalTodosConfig {
    /// Per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff base delay.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl KafkaConfig {
    /// Producer delivery timeout.
    #[must_use]
    pub const fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    /// Shutdown flush bound.
    #[must_use]
    pub const fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    /// Consumer poll timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);

        assert_eq!(
            config.external_todos.base_url,
            "https://jsonplaceholder.typicode.com/"
        );
        assert_eq!(config.external_todos.attempt_timeout(), Duration::from_secs(10));
        assert_eq!(config.external_todos.retry_count, 3);
        assert_eq!(
            config.external_todos.retry_base_delay(),
            Duration::from_millis(1000)
        );
        assert_eq!(config.external_todos.owner_id, 1);
        assert_eq!(config.external_todos.user_agent, "TodoSystem/1.0");
        assert!(config.external_todos.cache_enabled);
        assert_eq!(config.external_todos.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.external_todo_topic, "external-todos-created");
        assert_eq!(config.kafka.consumer_group, "todo-system-consumers");
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert_eq!(config.kafka.message_timeout(), Duration::from_millis(5000));
        assert_eq!(config.kafka.flush_timeout(), Duration::from_secs(10));
        assert_eq!(config.kafka.poll_timeout(), Duration::from_millis(1000));
        assert_eq!(config.event_source, "JSONPlaceholder");
        assert_eq!(config.metrics_addr, None);
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("EXTERNAL_TODOS_BASE_URL", "http://localhost:3000/api/"),
            ("EXTERNAL_TODOS_RETRY_COUNT", "5"),
            ("EXTERNAL_TODOS_CACHE_ENABLED", "false"),
            ("KAFKA_BROKERS", "broker-1:9092,broker-2:9092"),
            ("KAFKA_EXTERNAL_TODO_TOPIC", "todos"),
            ("EVENT_SOURCE", "Staging"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ]);

        assert_eq!(config.external_todos.base_url, "http://localhost:3000/api/");
        assert_eq!(config.external_todos.retry_count, 5);
        assert!(!config.external_todos.cache_enabled);
        assert_eq!(config.kafka.brokers, "broker-1:9092,broker-2:9092");
        assert_eq!(config.kafka.external_todo_topic, "todos");
        assert_eq!(config.event_source, "Staging");
        assert_eq!(
            config.metrics_addr,
            Some(SocketAddr::from(([127, 0, 0, 1], 9090)))
        );
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("EXTERNAL_TODOS_TIMEOUT_SECS", "ten"),
            ("KAFKA_POLL_TIMEOUT_MS", "-1"),
            ("METRICS_ADDR", "not an address"),
        ]);

        assert_eq!(config.external_todos.timeout_secs, 10);
        assert_eq!(config.kafka.poll_timeout_ms, 1000);
        assert_eq!(config.metrics_addr, None);
    }
}
