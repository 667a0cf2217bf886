//! Abuse-event pipeline: event types, Kafka producer, Kafka consumer
//!
//! Events are immutable once emitted. The wire format is UTF-8 JSON, one
//! event per message, keyed by IP so per-IP event streams stay totally
//! ordered at the consumer.

mod consumer;
mod producer;

pub use consumer::{AbuseEventHandler, EventConsumer};
pub use producer::EventProducer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a policy decision or detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RateLimitExceeded,
    AuthFailure,
    SuspiciousPattern,
    IpBlocked,
    BruteForce,
    ScanningDetected,
    AnomalyDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::AuthFailure => "AUTH_FAILURE",
            EventType::SuspiciousPattern => "SUSPICIOUS_PATTERN",
            EventType::IpBlocked => "IP_BLOCKED",
            EventType::BruteForce => "BRUTE_FORCE",
            EventType::ScanningDetected => "SCANNING_DETECTED",
            EventType::AnomalyDetected => "ANOMALY_DETECTED",
        }
    }
}

/// An abuse event as carried on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseEvent {
    pub id: String,
    pub ip: String,
    pub user_id: String,
    pub event_type: EventType,
    pub anomaly_score: f64,
    pub endpoint: String,
    pub method: String,
    pub user_agent: String,
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
}

impl AbuseEvent {
    pub fn new(
        ip: &str,
        user_id: &str,
        event_type: EventType,
        endpoint: &str,
        method: &str,
        user_agent: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            ip: ip.to_string(),
            user_id: user_id.to_string(),
            event_type,
            anomaly_score: 0.0,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            user_agent: user_agent.to_string(),
            timestamp: now.timestamp(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&EventType::RateLimitExceeded).unwrap();
        assert_eq!(json, r#""RATE_LIMIT_EXCEEDED""#);
        let json = serde_json::to_string(&EventType::IpBlocked).unwrap();
        assert_eq!(json, r#""IP_BLOCKED""#);
        assert_eq!(EventType::ScanningDetected.as_str(), "SCANNING_DETECTED");
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = AbuseEvent::new(
            "1.2.3.4",
            "user-1",
            EventType::RateLimitExceeded,
            "/api/orders",
            "POST",
            "curl/8.0",
        );

        let wire = serde_json::to_vec(&event).unwrap();
        let decoded: AbuseEvent = serde_json::from_slice(&wire).unwrap();

        assert_eq!(decoded.ip, "1.2.3.4");
        assert_eq!(decoded.event_type, EventType::RateLimitExceeded);
        assert_eq!(decoded.endpoint, "/api/orders");
        assert_eq!(decoded.anomaly_score, 0.0);
        assert_eq!(decoded.id, event.id);
    }

    #[test]
    fn test_unparseable_payload_is_an_error() {
        let result = serde_json::from_slice::<AbuseEvent>(b"not json");
        assert!(result.is_err());
    }
}
