//! Traffic statistics and the recent-requests ring
//!
//! Both tables live behind their own lock and are appended by the
//! post-response stage only, after the response has been written. The ring
//! is a fixed-capacity, newest-first log for the admin dashboard and is
//! not durable.

use crate::models::{RequestLog, TrafficStats};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Recent-requests ring capacity
const RECENT_CAPACITY: usize = 100;

#[derive(Default)]
struct StatsInner {
    total_requests: i64,
    success_requests: i64,
    blocked_requests: i64,
    latency_sum: i64,
}

/// Process-global request accounting
pub struct TrafficLog {
    stats: Mutex<StatsInner>,
    recent: Mutex<VecDeque<RequestLog>>,
}

impl Default for TrafficLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficLog {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(StatsInner::default()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        }
    }

    /// Account one completed request; returns the short request id used in
    /// the access log.
    pub fn record(
        &self,
        ip: &str,
        path: &str,
        method: &str,
        user_agent: &str,
        status: u16,
        latency_ms: i64,
        blocked: bool,
    ) -> String {
        let request_id = Uuid::new_v4().to_string()[..8].to_string();

        let entry = RequestLog {
            id: request_id.clone(),
            ip: ip.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            status,
            latency_ms,
            user_agent: user_agent.to_string(),
            timestamp: Utc::now(),
            blocked,
        };

        {
            let mut recent = self.recent.lock().unwrap();
            recent.push_front(entry);
            recent.truncate(RECENT_CAPACITY);
        }

        {
            let mut stats = self.stats.lock().unwrap();
            stats.total_requests += 1;
            if blocked || status == 429 {
                stats.blocked_requests += 1;
            } else if (200..400).contains(&status) {
                stats.success_requests += 1;
            }
            stats.latency_sum += latency_ms;
        }

        request_id
    }

    /// Current counters
    pub fn snapshot(&self) -> TrafficStats {
        let stats = self.stats.lock().unwrap();
        let avg_latency_ms = if stats.total_requests > 0 {
            stats.latency_sum / stats.total_requests
        } else {
            0
        };
        TrafficStats {
            total_requests: stats.total_requests,
            success_requests: stats.success_requests,
            blocked_requests: stats.blocked_requests,
            avg_latency_ms,
        }
    }

    /// Recent requests, newest first
    pub fn recent(&self) -> Vec<RequestLog> {
        self.recent.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_returns_short_id() {
        let log = TrafficLog::new();
        let id = log.record("1.2.3.4", "/api/x", "GET", "ua", 200, 5, false);
        assert_eq!(id.len(), 8);
    }

    #[test]
    fn test_ring_caps_at_capacity_newest_first() {
        let log = TrafficLog::new();
        for i in 0..150 {
            log.record("1.2.3.4", &format!("/api/{}", i), "GET", "ua", 200, 1, false);
        }

        let recent = log.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent.first().unwrap().path, "/api/149");
        assert_eq!(recent.last().unwrap().path, "/api/50");
    }

    #[test]
    fn test_stats_accounting() {
        let log = TrafficLog::new();
        log.record("1.2.3.4", "/api/a", "GET", "ua", 200, 10, false);
        log.record("1.2.3.4", "/api/a", "GET", "ua", 302, 20, false);
        log.record("1.2.3.4", "/api/a", "GET", "ua", 429, 30, true);
        log.record("1.2.3.4", "/api/a", "GET", "ua", 403, 40, false);

        let stats = log.snapshot();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.success_requests, 2);
        assert_eq!(stats.blocked_requests, 1);
        assert_eq!(stats.avg_latency_ms, 25);
        assert!(stats.success_requests + stats.blocked_requests <= stats.total_requests);
    }

    #[test]
    fn test_empty_snapshot() {
        let log = TrafficLog::new();
        let stats = log.snapshot();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.avg_latency_ms, 0);
    }
}
