//! Integration tests for [`RedpandaEventBus`] and [`RedpandaMessageSource`] with a
//! real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Publish/poll round-trip with key and headers intact
//! - Topic existence checks
//! - Committed offsets survive a new consumer in the same group
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p todo-sync-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use todo_sync_core::{ConsumedMessage, EventBus, EventMessage, MessageHeaders, MessageSource};
use todo_sync_redpanda::{RedpandaEventBus, RedpandaMessageSource};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn message(key: &str, payload: &str) -> EventMessage {
    let mut headers = MessageHeaders::new();
    headers.insert("eventType", "ExternalTodoCreated");
    headers.insert("correlationId", format!("corr-{key}"));
    headers.insert("source", "JSONPlaceholder");
    EventMessage {
        key: key.to_string(),
        payload: payload.as_bytes().to_vec(),
        headers,
    }
}

/// Publish until the broker accepts, which also auto-creates the topic.
async fn publish_when_ready(bus: &RedpandaEventBus, topic: &str, message: &EventMessage) {
    for attempt in 1..=60 {
        if bus.publish(topic, message).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka did not accept a publish to {topic}");
    }
}

fn source(brokers: &str, group: &str) -> RedpandaMessageSource {
    RedpandaMessageSource::builder()
        .brokers(brokers)
        .group_id(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create message source")
}

async fn poll_until(source: &mut RedpandaMessageSource, count: usize) -> Vec<ConsumedMessage> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while received.len() < count {
            if let Some(message) = source
                .poll(Duration::from_secs(1))
                .await
                .expect("poll failed")
            {
                received.push(message);
            }
        }
    })
    .await
    .expect("Timeout waiting for messages");
    received
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn published_message_is_consumed_with_key_and_headers() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::new(&brokers).expect("Failed to create event bus");
    let sent = message("todo-1", r#"{"id":"todo-1"}"#);
    publish_when_ready(&bus, "external-todos-created", &sent).await;

    let mut source = source(&brokers, "round-trip");
    assert!(
        source
            .topic_exists("external-todos-created")
            .await
            .expect("metadata")
    );
    source
        .subscribe("external-todos-created")
        .expect("Failed to subscribe");

    let received = poll_until(&mut source, 1).await;

    assert_eq!(received[0].key.as_deref(), Some("todo-1"));
    assert_eq!(received[0].payload.as_deref(), Some(sent.payload.as_slice()));
    assert_eq!(received[0].headers, sent.headers);

    source.commit(&received[0]).expect("commit");
    source.close();
    bus.flush(Duration::from_secs(10)).await.expect("flush");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn missing_topic_is_reported_absent() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::new(&brokers).expect("Failed to create event bus");
    publish_when_ready(&bus, "warmup", &message("w", "{}")).await;

    let source = source(&brokers, "metadata");
    let exists = source
        .topic_exists("never-created")
        .await
        .expect("metadata");

    assert!(!exists);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn committed_offsets_are_not_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::new(&brokers).expect("Failed to create event bus");
    publish_when_ready(&bus, "commits", &message("a", "first")).await;
    bus.publish("commits", &message("b", "second"))
        .await
        .expect("publish");

    let mut first = source(&brokers, "commit-group");
    first.subscribe("commits").expect("subscribe");
    let received = poll_until(&mut first, 1).await;
    first.commit(&received[0]).expect("commit");
    // Async commit; give it time to land before leaving the group
    tokio::time::sleep(Duration::from_secs(2)).await;
    first.close();
    drop(first);

    let mut second = source(&brokers, "commit-group");
    second.subscribe("commits").expect("subscribe");
    let resumed = poll_until(&mut second, 1).await;

    assert_eq!(resumed[0].offset, received[0].offset + 1);
}
