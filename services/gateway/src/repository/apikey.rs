//! API key issuance and validation

use crate::models::ApiKey;
use gatewarden_common::error::{Error, Result};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, key))]
    pub async fn get_by_key(&self, key: &str) -> Result<ApiKey> {
        let row = sqlx::query(
            "SELECT id, user_id, api_key, is_active, created_at FROM api_keys WHERE api_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("ApiKey", "redacted"))?;

        Ok(ApiKey {
            id: row.get("id"),
            user_id: row.get("user_id"),
            api_key: row.get("api_key"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        })
    }

    /// Resolve a key to its owner; the caller decides what an inactive key
    /// means.
    #[instrument(skip(self, key))]
    pub async fn validate_key(&self, key: &str) -> Result<(Uuid, bool)> {
        let api_key = self.get_by_key(key).await?;
        Ok((api_key.user_id, api_key.is_active))
    }
}
