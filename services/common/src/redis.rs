//! Redis connection and caching utilities

use crate::config::Config;
use crate::error::{Error, Result};
use deadpool_redis::{redis, redis::AsyncCommands, Config as DeadpoolConfig, Pool, Runtime};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::info;

/// Create a Redis connection pool
pub async fn create_pool(config: &Config) -> Result<Pool> {
    info!("Connecting to Redis with pool size: {}", config.redis_pool_size);

    let cfg = DeadpoolConfig::from_url(config.redis_url());
    let pool = cfg
        .builder()
        .map_err(|e| Error::Internal(format!("Redis pool builder error: {}", e)))?
        .max_size(config.redis_pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Internal(format!("Redis pool build error: {}", e)))?;

    // Test connection
    let mut conn = pool
        .get()
        .await
        .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| Error::Internal(format!("Redis ping error: {}", e)))?;

    info!("Redis connection established");
    Ok(pool)
}

/// Cache service for Redis operations
#[derive(Clone)]
pub struct CacheService {
    pool: Pool,
    prefix: String,
}

impl CacheService {
    /// Create a new cache service
    pub fn new(pool: Pool, prefix: &str) -> Self {
        Self {
            pool,
            prefix: prefix.to_string(),
        }
    }

    /// Build a cache key with prefix
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let value: Option<String> = conn.get(self.key(key)).await?;

        match value {
            Some(v) => {
                let parsed: T = serde_json::from_str(&v)
                    .map_err(|e| Error::Internal(format!("Cache deserialization error: {}", e)))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Set a value in cache with TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let json = serde_json::to_string(value)
            .map_err(|e| Error::Internal(format!("Cache serialization error: {}", e)))?;

        let _: () = conn.set_ex(self.key(key), json, ttl.as_secs()).await?;
        Ok(())
    }

    /// Delete a value from cache
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Redis connection error: {}", e)))?;

        let exists: bool = conn.exists(self.key(key)).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_cache_key_format() {
        // Key format: prefix:key
        let prefix = "gatewarden";
        let key = "limit:PRO";
        let expected = format!("{}:{}", prefix, key);
        assert_eq!(expected, "gatewarden:limit:PRO");
    }
}
