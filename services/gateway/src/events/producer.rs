//! Abuse-event producer
//!
//! Publishes to the partitioned log with partition key = IP. Batching is
//! soft-bounded (about 100 messages or 10 ms) with one-replica acks.
//! Publication is best-effort: callers must not fail the HTTP response on
//! a publish error.

use super::AbuseEvent;
use gatewarden_common::error::{Error, Result};
use gatewarden_common::metrics;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.ms", "10")
            .set("batch.num.messages", "100")
            .set("acks", "1")
            .create()
            .map_err(|e| Error::event_bus(format!("Producer creation failed: {}", e)))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    /// Publish one event, keyed by IP for per-IP ordering
    pub async fn publish(&self, event: &AbuseEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| Error::event_bus(format!("Event serialization failed: {}", e)))?;

        let record = FutureRecord::to(&self.topic)
            .key(&event.ip)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(e, _)| Error::event_bus(e.to_string()))?;

        metrics::ABUSE_EVENTS_TOTAL
            .with_label_values(&[event.event_type.as_str()])
            .inc();
        debug!(
            event_type = event.event_type.as_str(),
            ip = %event.ip,
            "Abuse event published"
        );

        Ok(())
    }
}
