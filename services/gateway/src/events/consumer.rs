//! Abuse-event consumer
//!
//! Drains the event topic under the `abuse-detectors` consumer group and
//! hands each decoded event to the handler. Unparseable messages are
//! logged and skipped; handler errors are logged and do not halt
//! consumption.

use super::AbuseEvent;
use crate::repository::AbuseEventRepository;
use gatewarden_common::error::{Error, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Persists events when Postgres is attached, otherwise logs them
pub struct AbuseEventHandler {
    repo: Option<AbuseEventRepository>,
}

impl AbuseEventHandler {
    pub fn new(repo: Option<AbuseEventRepository>) -> Self {
        Self { repo }
    }

    pub async fn handle(&self, event: &AbuseEvent) -> Result<()> {
        match &self.repo {
            Some(repo) => repo.insert(event).await,
            None => {
                info!(
                    event_type = event.event_type.as_str(),
                    ip = %event.ip,
                    user_id = %event.user_id,
                    anomaly_score = event.anomaly_score,
                    "Received abuse event"
                );
                Ok(())
            }
        }
    }
}

pub struct EventConsumer {
    consumer: StreamConsumer,
    handler: AbuseEventHandler,
}

impl EventConsumer {
    pub fn new(
        brokers: &str,
        topic: &str,
        group_id: &str,
        handler: AbuseEventHandler,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| Error::event_bus(format!("Consumer creation failed: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| Error::event_bus(format!("Subscribe failed: {}", e)))?;

        Ok(Self { consumer, handler })
    }

    /// Drain the topic until the shutdown signal flips
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Abuse event consumer started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    result = self.consumer.recv() => {
                        let msg = match result {
                            Ok(msg) => msg,
                            Err(e) => {
                                error!(error = %e, "Error reading message");
                                continue;
                            }
                        };

                        let Some(payload) = msg.payload() else {
                            continue;
                        };

                        let event = match serde_json::from_slice::<AbuseEvent>(payload) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(error = %e, "Error unmarshaling event, skipping");
                                continue;
                            }
                        };

                        if let Err(e) = self.handler.handle(&event).await {
                            error!(error = %e, "Error handling event");
                        }
                    }
                }
            }
            info!("Abuse event consumer stopped");
        })
    }
}
