//! IP reputation engine
//!
//! Tracks per-IP counters, a 0-100 score, and suspicion/block flags. The
//! in-memory table is the source of truth while the process runs; the
//! Postgres mirror is written back lazily and reloaded only at startup.
//! The block set is mirrored separately so the hot-path check on L2 is a
//! single constant-time lookup under a shared lock.

use crate::models::IpReputation;
use crate::repository::IpReputationRepository;
use gatewarden_common::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{info, warn};

/// Block count at which an IP is flagged as suspicious
const SUSPICIOUS_BLOCKED_THRESHOLD: i64 = 5;
/// Block count at which an IP is blocked automatically
const AUTO_BLOCK_THRESHOLD: i64 = 20;
/// Score below which an IP is flagged as suspicious
const SUSPICIOUS_SCORE_THRESHOLD: f64 = 30.0;
/// Minimum requests before the score is recomputed
const MIN_REQUESTS_FOR_SCORE: i64 = 3;
/// User-agent history cap per IP
const MAX_TRACKED_USER_AGENTS: usize = 5;
/// Deadline for the lazy write-back to Postgres
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Canonical client IP: strip a trailing port and surrounding brackets.
/// Bare IPv6 addresses (two or more colons, no brackets) pass through.
pub fn canonical_ip(raw: &str) -> String {
    let s = raw.trim();
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }
    if s.matches(':').count() == 1 {
        if let Some((host, port)) = s.rsplit_once(':') {
            if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
                return host.to_string();
            }
        }
    }
    s.to_string()
}

/// In-memory reputation table with a separately mirrored block set.
///
/// Lock order is always table before blocked; neither lock is ever held
/// across an await point.
pub struct ReputationEngine {
    table: RwLock<HashMap<String, IpReputation>>,
    blocked: RwLock<HashSet<String>>,
    repo: Option<IpReputationRepository>,
}

impl ReputationEngine {
    pub fn new(repo: Option<IpReputationRepository>) -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            blocked: RwLock::new(HashSet::new()),
            repo,
        }
    }

    /// Account one completed request for an IP and re-evaluate its flags.
    ///
    /// `was_blocked` means the request was denied by the rate-limit gate.
    /// Returns a snapshot of the updated record.
    pub fn record_request(&self, ip: &str, user_agent: &str, was_blocked: bool) -> IpReputation {
        let clean_ip = canonical_ip(ip);
        let now = chrono::Utc::now();

        let snapshot = {
            let mut table = self.table.write().unwrap();
            let rep = table
                .entry(clean_ip.clone())
                .or_insert_with(|| IpReputation::new(&clean_ip));

            rep.total_requests += 1;
            rep.last_seen = now;

            if was_blocked {
                rep.blocked_requests += 1;
            } else {
                rep.success_requests += 1;
            }

            if !user_agent.is_empty() && !rep.user_agents.iter().any(|ua| ua == user_agent) {
                rep.user_agents.push(user_agent.to_string());
                if rep.user_agents.len() > MAX_TRACKED_USER_AGENTS {
                    rep.user_agents.remove(0);
                }
            }

            if rep.total_requests >= MIN_REQUESTS_FOR_SCORE {
                let success_rate =
                    rep.success_requests as f64 / rep.total_requests as f64 * 100.0;
                let block_penalty = rep.blocked_requests as f64 * 5.0;
                rep.score = (success_rate - block_penalty).max(0.0);
            }

            if !rep.is_suspicious
                && (rep.blocked_requests >= SUSPICIOUS_BLOCKED_THRESHOLD
                    || rep.score < SUSPICIOUS_SCORE_THRESHOLD)
            {
                rep.is_suspicious = true;
                rep.reason = Some("High number of blocked requests".to_string());
            }

            if rep.blocked_requests >= AUTO_BLOCK_THRESHOLD && !rep.is_blocked {
                rep.is_blocked = true;
                rep.reason =
                    Some("Automatically blocked: exceeded block threshold".to_string());

                let mut blocked = self.blocked.write().unwrap();
                blocked.insert(clean_ip.clone());
                metrics::BLOCKED_IPS.set(blocked.len() as i64);
                info!(ip = %clean_ip, blocked_requests = rep.blocked_requests, "IP auto-blocked");
            }

            rep.clone()
        };

        self.schedule_sync(snapshot.clone());
        snapshot
    }

    /// Constant-time block check for the L2 gate
    pub fn is_blocked(&self, ip: &str) -> bool {
        let clean_ip = canonical_ip(ip);
        self.blocked.read().unwrap().contains(&clean_ip)
    }

    /// Reputation for one IP; unknown IPs get a default clean record
    pub fn get(&self, ip: &str) -> IpReputation {
        let clean_ip = canonical_ip(ip);
        self.table
            .read()
            .unwrap()
            .get(&clean_ip)
            .cloned()
            .unwrap_or_else(|| IpReputation::new(&clean_ip))
    }

    /// All tracked reputations
    pub fn all(&self) -> Vec<IpReputation> {
        self.table.read().unwrap().values().cloned().collect()
    }

    /// Reputations flagged suspicious or blocked
    pub fn suspicious(&self) -> Vec<IpReputation> {
        self.table
            .read()
            .unwrap()
            .values()
            .filter(|rep| rep.is_suspicious || rep.is_blocked)
            .cloned()
            .collect()
    }

    /// Records for every IP in the block set
    pub fn blocked_list(&self) -> Vec<IpReputation> {
        let table = self.table.read().unwrap();
        let blocked = self.blocked.read().unwrap();
        blocked
            .iter()
            .filter_map(|ip| table.get(ip).cloned())
            .collect()
    }

    /// Size of the block set
    pub fn blocked_count(&self) -> usize {
        self.blocked.read().unwrap().len()
    }

    /// Block an IP by operator decision. Counters are left untouched.
    pub fn manual_block(&self, ip: &str, reason: Option<String>) -> IpReputation {
        let clean_ip = canonical_ip(ip);

        let snapshot = {
            let mut table = self.table.write().unwrap();
            let rep = table.entry(clean_ip.clone()).or_insert_with(|| {
                let mut fresh = IpReputation::new(&clean_ip);
                fresh.score = 0.0;
                fresh
            });
            rep.is_blocked = true;
            rep.is_suspicious = true;
            rep.reason = Some(
                reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "Manually blocked by admin".to_string()),
            );

            let mut blocked = self.blocked.write().unwrap();
            blocked.insert(clean_ip.clone());
            metrics::BLOCKED_IPS.set(blocked.len() as i64);

            rep.clone()
        };

        info!(ip = %clean_ip, "IP manually blocked");
        self.schedule_sync(snapshot.clone());
        snapshot
    }

    /// Lift a block. Counters are left untouched.
    pub fn manual_unblock(&self, ip: &str) -> bool {
        let clean_ip = canonical_ip(ip);

        let snapshot = {
            let mut table = self.table.write().unwrap();
            let snapshot = table.get_mut(&clean_ip).map(|rep| {
                rep.is_blocked = false;
                rep.reason = Some("Unblocked by admin".to_string());
                rep.clone()
            });

            let mut blocked = self.blocked.write().unwrap();
            blocked.remove(&clean_ip);
            metrics::BLOCKED_IPS.set(blocked.len() as i64);

            snapshot
        };

        if let Some(rep) = snapshot {
            self.schedule_sync(rep);
        }
        info!(ip = %clean_ip, "IP manually unblocked");
        true
    }

    /// Re-hydrate the table and block set from the persistent mirror.
    /// Called once at process start; steady-state reads never hit Postgres.
    pub async fn load_from_store(&self) -> gatewarden_common::Result<usize> {
        let Some(repo) = &self.repo else {
            return Ok(0);
        };

        let rows = repo.get_all().await?;
        let count = rows.len();

        let mut table = self.table.write().unwrap();
        let mut blocked = self.blocked.write().unwrap();
        for rep in rows {
            if rep.is_blocked {
                blocked.insert(rep.ip.clone());
            }
            table.insert(rep.ip.clone(), rep);
        }
        metrics::BLOCKED_IPS.set(blocked.len() as i64);

        info!(count, "Reputation state reloaded from store");
        Ok(count)
    }

    /// Fire-and-forget write-back; failure degrades telemetry only
    fn schedule_sync(&self, rep: IpReputation) {
        let Some(repo) = &self.repo else {
            return;
        };
        let repo = repo.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(SYNC_TIMEOUT, repo.upsert(&rep)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(ip = %rep.ip, error = %e, "Failed to sync IP reputation to database");
                }
                Err(_) => {
                    warn!(ip = %rep.ip, "IP reputation sync timed out");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ReputationEngine {
        ReputationEngine::new(None)
    }

    #[test]
    fn test_canonical_ip() {
        assert_eq!(canonical_ip("1.2.3.4"), "1.2.3.4");
        assert_eq!(canonical_ip("1.2.3.4:8080"), "1.2.3.4");
        assert_eq!(canonical_ip("[::1]:8080"), "::1");
        assert_eq!(canonical_ip("[2001:db8::1]"), "2001:db8::1");
        assert_eq!(canonical_ip("2001:db8::1"), "2001:db8::1");
        assert_eq!(canonical_ip(" 9.9.9.9 "), "9.9.9.9");
    }

    #[tokio::test]
    async fn test_score_formula() {
        let engine = engine();

        // 2 allowed, 1 denied: score = 2/3 * 100 - 5 = 61.66..
        engine.record_request("1.2.3.4", "ua", false);
        engine.record_request("1.2.3.4", "ua", false);
        let rep = engine.record_request("1.2.3.4", "ua", true);

        let expected = 2.0 / 3.0 * 100.0 - 5.0;
        assert!((rep.score - expected).abs() < 1e-9);
        assert_eq!(rep.total_requests, 3);
        assert_eq!(rep.success_requests, 2);
        assert_eq!(rep.blocked_requests, 1);
    }

    #[tokio::test]
    async fn test_score_not_computed_below_minimum() {
        let engine = engine();
        let rep = engine.record_request("1.2.3.4", "ua", true);
        // Only one request: score stays at the initial 100
        assert_eq!(rep.score, 100.0);
    }

    #[tokio::test]
    async fn test_score_clamped_at_zero() {
        let engine = engine();
        for _ in 0..30 {
            engine.record_request("1.2.3.4", "ua", true);
        }
        let rep = engine.get("1.2.3.4");
        assert_eq!(rep.score, 0.0);
    }

    #[tokio::test]
    async fn test_counters_inequality() {
        let engine = engine();
        for i in 0..50 {
            engine.record_request("1.2.3.4", "ua", i % 3 == 0);
        }
        let rep = engine.get("1.2.3.4");
        assert!(rep.success_requests + rep.blocked_requests <= rep.total_requests);
        assert_eq!(rep.total_requests, 50);
    }

    #[tokio::test]
    async fn test_suspicious_after_five_blocks() {
        let engine = engine();
        for _ in 0..4 {
            engine.record_request("1.2.3.4", "ua", true);
        }
        assert!(!engine.is_blocked("1.2.3.4"));

        let rep = engine.record_request("1.2.3.4", "ua", true);
        assert!(rep.is_suspicious);
        assert_eq!(
            rep.reason.as_deref(),
            Some("High number of blocked requests")
        );
    }

    #[tokio::test]
    async fn test_auto_block_at_threshold() {
        let engine = engine();
        for _ in 0..19 {
            engine.record_request("1.2.3.4", "ua", true);
        }
        assert!(!engine.is_blocked("1.2.3.4"));

        let rep = engine.record_request("1.2.3.4", "ua", true);
        assert!(rep.is_blocked);
        assert_eq!(
            rep.reason.as_deref(),
            Some("Automatically blocked: exceeded block threshold")
        );
        assert!(engine.is_blocked("1.2.3.4"));
        assert_eq!(engine.blocked_count(), 1);
    }

    #[tokio::test]
    async fn test_user_agent_history_caps_at_five() {
        let engine = engine();
        for i in 0..8 {
            engine.record_request("1.2.3.4", &format!("agent-{}", i), false);
        }
        // Duplicate of the newest agent must not be re-appended
        let rep = engine.record_request("1.2.3.4", "agent-7", false);

        assert_eq!(rep.user_agents.len(), 5);
        assert_eq!(rep.user_agents.first().map(String::as_str), Some("agent-3"));
        assert_eq!(rep.user_agents.last().map(String::as_str), Some("agent-7"));
    }

    #[tokio::test]
    async fn test_manual_block_unblock_roundtrip() {
        let engine = engine();
        engine.record_request("1.2.3.4", "ua", false);
        engine.record_request("1.2.3.4", "ua", false);
        let before = engine.get("1.2.3.4");

        let blocked = engine.manual_block("1.2.3.4", None);
        assert!(blocked.is_blocked);
        assert_eq!(blocked.reason.as_deref(), Some("Manually blocked by admin"));
        assert!(engine.is_blocked("1.2.3.4"));

        assert!(engine.manual_unblock("1.2.3.4"));
        let after = engine.get("1.2.3.4");
        assert!(!after.is_blocked);
        assert!(!engine.is_blocked("1.2.3.4"));
        assert_eq!(after.reason.as_deref(), Some("Unblocked by admin"));

        // Neither operation touches the counters
        assert_eq!(after.total_requests, before.total_requests);
        assert_eq!(after.success_requests, before.success_requests);
        assert_eq!(after.blocked_requests, before.blocked_requests);
    }

    #[tokio::test]
    async fn test_manual_block_custom_reason_and_unknown_ip() {
        let engine = engine();
        let rep = engine.manual_block("5.6.7.8", Some("reported by upstream".to_string()));
        assert!(rep.is_blocked);
        assert!(rep.is_suspicious);
        assert_eq!(rep.score, 0.0);
        assert_eq!(rep.reason.as_deref(), Some("reported by upstream"));
    }

    #[tokio::test]
    async fn test_block_keyed_on_canonical_ip() {
        let engine = engine();
        engine.manual_block("1.2.3.4:5555", None);
        assert!(engine.is_blocked("1.2.3.4"));
        assert!(engine.is_blocked("1.2.3.4:9999"));
    }

    #[tokio::test]
    async fn test_projections() {
        let engine = engine();
        engine.record_request("10.0.0.1", "ua", false);
        engine.manual_block("10.0.0.2", None);
        for _ in 0..5 {
            engine.record_request("10.0.0.3", "ua", true);
        }

        assert_eq!(engine.all().len(), 3);
        let suspicious = engine.suspicious();
        assert_eq!(suspicious.len(), 2);
        let blocked = engine.blocked_list();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].ip, "10.0.0.2");
    }
}
