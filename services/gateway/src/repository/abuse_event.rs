//! Abuse-event persistence, fed by the event-pipeline consumer

use crate::events::AbuseEvent;
use crate::models::AbuseEventRecord;
use gatewarden_common::error::Result;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AbuseEventRepository {
    pool: PgPool,
}

impl AbuseEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type.as_str(), ip = %event.ip))]
    pub async fn insert(&self, event: &AbuseEvent) -> Result<()> {
        let id = Uuid::parse_str(&event.id).unwrap_or_else(|_| Uuid::new_v4());
        let user_id = Uuid::parse_str(&event.user_id).ok();

        sqlx::query(
            "INSERT INTO abuse_events (id, ip, user_id, event_type, anomaly_score, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(&event.ip)
        .bind(user_id)
        .bind(event.event_type.as_str())
        .bind(event.anomaly_score)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_by_ip(&self, ip: &str, limit: i64) -> Result<Vec<AbuseEventRecord>> {
        let rows = sqlx::query(
            "SELECT id, ip, user_id, event_type, anomaly_score, created_at \
             FROM abuse_events WHERE ip = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(ip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AbuseEventRecord {
                id: row.get("id"),
                ip: row.get("ip"),
                user_id: row.get("user_id"),
                event_type: row.get("event_type"),
                anomaly_score: row.get("anomaly_score"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

}
