//! User and rate-limit rule lookups

use crate::models::{Plan, User};
use gatewarden_common::error::{Error, Result};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query(
            "SELECT id, email, plan, reputation_score, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("User", id.to_string()))?;

        Ok(row_to_user(&row))
    }

    /// Per-window limit for a plan from the authoritative rules table
    #[instrument(skip(self))]
    pub async fn rate_limit_for_plan(&self, plan: Plan) -> Result<i64> {
        let row =
            sqlx::query("SELECT requests_per_min FROM rate_limit_rules WHERE plan = $1")
                .bind(plan.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::not_found("RateLimitRule", plan.as_str()))?;

        let limit: i32 = row.get("requests_per_min");
        Ok(limit as i64)
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    let plan: String = row.get("plan");
    User {
        id: row.get("id"),
        email: row.get("email"),
        plan: Plan::parse(&plan),
        reputation_score: row.get("reputation_score"),
        created_at: row.get("created_at"),
    }
}
