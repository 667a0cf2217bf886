//! Domain models shared across the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription plan, determining the per-window rate limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Pro => "PRO",
            Plan::Enterprise => "ENTERPRISE",
        }
    }

    /// Parse a stored plan value; unknown values downgrade to FREE
    pub fn parse(s: &str) -> Self {
        match s {
            "PRO" => Plan::Pro,
            "ENTERPRISE" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }

    /// Per-window limit used when the rules table is unreachable
    pub fn fallback_limit(&self, free_default: i64) -> i64 {
        match self {
            Plan::Free => free_default,
            Plan::Pro => 1000,
            Plan::Enterprise => 10000,
        }
    }
}

/// A registered caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub plan: Plan,
    pub reputation_score: f64,
    pub created_at: DateTime<Utc>,
}

/// An issued API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-IP reputation aggregate
///
/// The in-memory record is authoritative; the persisted row is a projection
/// of it (without the user-agent history, which the schema does not carry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip: String,
    pub total_requests: i64,
    pub blocked_requests: i64,
    pub success_requests: i64,
    /// 0-100, lower = more suspicious
    pub score: f64,
    pub is_blocked: bool,
    pub is_suspicious: bool,
    pub last_seen: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub user_agents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IpReputation {
    /// New record with a perfect starting score
    pub fn new(ip: &str) -> Self {
        let now = Utc::now();
        Self {
            ip: ip.to_string(),
            total_requests: 0,
            blocked_requests: 0,
            success_requests: 0,
            score: 100.0,
            is_blocked: false,
            is_suspicious: false,
            last_seen: now,
            first_seen: now,
            user_agents: Vec::new(),
            reason: None,
        }
    }
}

/// A persisted abuse-event row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseEventRecord {
    pub id: Uuid,
    pub ip: String,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub anomaly_score: f64,
    pub created_at: DateTime<Utc>,
}

/// One completed request, as kept in the recent-requests ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub ip: String,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub latency_ms: i64,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub blocked: bool,
}

/// Process-global traffic counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrafficStats {
    pub total_requests: i64,
    pub success_requests: i64,
    pub blocked_requests: i64,
    pub avg_latency_ms: i64,
}

/// Rate-limit outcome surfaced through response headers
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parse_roundtrip() {
        assert_eq!(Plan::parse("FREE"), Plan::Free);
        assert_eq!(Plan::parse("PRO"), Plan::Pro);
        assert_eq!(Plan::parse("ENTERPRISE"), Plan::Enterprise);
        assert_eq!(Plan::parse("GOLD"), Plan::Free);
        assert_eq!(Plan::Pro.as_str(), "PRO");
    }

    #[test]
    fn test_plan_fallback_limits() {
        assert_eq!(Plan::Free.fallback_limit(100), 100);
        assert_eq!(Plan::Free.fallback_limit(250), 250);
        assert_eq!(Plan::Pro.fallback_limit(100), 1000);
        assert_eq!(Plan::Enterprise.fallback_limit(100), 10000);
    }

    #[test]
    fn test_plan_serde_uppercase() {
        let json = serde_json::to_string(&Plan::Enterprise).unwrap();
        assert_eq!(json, r#""ENTERPRISE""#);
        let plan: Plan = serde_json::from_str(r#""PRO""#).unwrap();
        assert_eq!(plan, Plan::Pro);
    }

    #[test]
    fn test_new_reputation_starts_clean() {
        let rep = IpReputation::new("1.2.3.4");
        assert_eq!(rep.score, 100.0);
        assert_eq!(rep.total_requests, 0);
        assert!(!rep.is_blocked);
        assert!(!rep.is_suspicious);
        assert!(rep.reason.is_none());
    }
}
