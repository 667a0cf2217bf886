//! Persistent mirror of the in-memory reputation table

use crate::models::IpReputation;
use gatewarden_common::error::Result;
use sqlx::{PgPool, Row};
use tracing::instrument;

#[derive(Clone)]
pub struct IpReputationRepository {
    pool: PgPool,
}

impl IpReputationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write back one record; last writer wins across gateway instances
    #[instrument(skip(self, rep), fields(ip = %rep.ip))]
    pub async fn upsert(&self, rep: &IpReputation) -> Result<()> {
        sqlx::query(
            "INSERT INTO ip_reputation \
               (ip, score, total_requests, success_requests, blocked_requests, \
                is_blocked, is_suspicious, reason, first_seen, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (ip) DO UPDATE SET \
               score = EXCLUDED.score, \
               total_requests = EXCLUDED.total_requests, \
               success_requests = EXCLUDED.success_requests, \
               blocked_requests = EXCLUDED.blocked_requests, \
               is_blocked = EXCLUDED.is_blocked, \
               is_suspicious = EXCLUDED.is_suspicious, \
               reason = EXCLUDED.reason, \
               last_seen = EXCLUDED.last_seen",
        )
        .bind(&rep.ip)
        .bind(rep.score)
        .bind(rep.total_requests)
        .bind(rep.success_requests)
        .bind(rep.blocked_requests)
        .bind(rep.is_blocked)
        .bind(rep.is_suspicious)
        .bind(&rep.reason)
        .bind(rep.first_seen)
        .bind(rep.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<IpReputation>> {
        let rows = sqlx::query(
            "SELECT ip, score, total_requests, success_requests, blocked_requests, \
                    is_blocked, is_suspicious, reason, first_seen, last_seen \
             FROM ip_reputation ORDER BY last_seen DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_reputation).collect())
    }

}

/// The persisted row carries no user-agent history; it is restored empty.
fn row_to_reputation(row: &sqlx::postgres::PgRow) -> IpReputation {
    IpReputation {
        ip: row.get("ip"),
        score: row.get("score"),
        total_requests: row.get("total_requests"),
        success_requests: row.get("success_requests"),
        blocked_requests: row.get("blocked_requests"),
        is_blocked: row.get("is_blocked"),
        is_suspicious: row.get("is_suspicious"),
        reason: row.get("reason"),
        first_seen: row.get("first_seen"),
        last_seen: row.get("last_seen"),
        user_agents: Vec::new(),
    }
}
