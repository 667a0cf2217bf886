//! Distributed sliding-window rate limiting
//!
//! The window state for each key lives in Redis as an ordered set of
//! arrival timestamps. The trim/count/insert sequence runs as a single
//! server-side script so that concurrent gateway instances agree on the
//! per-key count; a read-then-write emulation would admit lost-update
//! bursts equal to the number of instances.

use crate::error::{Error, Result};
use deadpool_redis::redis::Script;

/// Outcome of a sliding-window check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Cardinality of the window after the check (includes this request
    /// when admitted)
    pub count: i64,
    /// The limit the check ran against
    pub limit: i64,
}

impl RateLimitDecision {
    /// Requests left in the current window, clamped at zero
    pub fn remaining(&self) -> i64 {
        (self.limit - self.count).max(0)
    }
}

const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call("ZREMRANGEBYSCORE", key, 0, now - window)
local count = redis.call("ZCARD", key)

if count >= limit then
    return {0, count}
end

redis.call("ZADD", key, now, now)
redis.call("EXPIRE", key, window)
return {1, count + 1}
"#;

/// Sliding-window rate limiter backed by Redis
pub struct SlidingWindowLimiter {
    pool: deadpool_redis::Pool,
    script: Script,
    window_seconds: u64,
}

impl SlidingWindowLimiter {
    /// Create a new limiter over an existing pool
    pub fn new(pool: deadpool_redis::Pool, window_seconds: u64) -> Self {
        Self {
            pool,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            window_seconds,
        }
    }

    /// Window length in seconds
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Run the atomic check for one key against the given limit
    pub async fn check(&self, key: &str, limit: i64) -> Result<RateLimitDecision> {
        let now = chrono::Utc::now().timestamp();

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let (allowed, count): (i64, i64) = self
            .script
            .key(key)
            .arg(now)
            .arg(self.window_seconds)
            .arg(limit)
            .invoke_async(&mut *conn)
            .await?;

        Ok(RateLimitDecision {
            allowed: allowed == 1,
            count,
            limit,
        })
    }

    /// Drop all recorded arrivals for a key
    pub async fn reset(&self, key: &str) -> Result<()> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_after_allow() {
        let decision = RateLimitDecision {
            allowed: true,
            count: 3,
            limit: 100,
        };
        assert_eq!(decision.remaining(), 97);
    }

    #[test]
    fn test_remaining_clamped_at_zero() {
        let decision = RateLimitDecision {
            allowed: false,
            count: 100,
            limit: 100,
        };
        assert_eq!(decision.remaining(), 0);

        let over = RateLimitDecision {
            allowed: false,
            count: 105,
            limit: 100,
        };
        assert_eq!(over.remaining(), 0);
    }

    #[test]
    fn test_script_is_atomic_trim_count_insert() {
        // The script must trim expired members, count, and insert in one
        // round trip; the deny path must not insert.
        assert!(SLIDING_WINDOW_SCRIPT.contains("ZREMRANGEBYSCORE"));
        assert!(SLIDING_WINDOW_SCRIPT.contains("ZCARD"));
        assert!(SLIDING_WINDOW_SCRIPT.contains("ZADD"));
        assert!(SLIDING_WINDOW_SCRIPT.contains("EXPIRE"));
        let deny_branch = SLIDING_WINDOW_SCRIPT
            .split("if count >= limit then")
            .nth(1)
            .unwrap()
            .split("end")
            .next()
            .unwrap();
        assert!(!deny_branch.contains("ZADD"));
    }
}
