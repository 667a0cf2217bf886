//! Database connection management and schema bootstrap

use crate::config::Config;
use crate::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Create a PostgreSQL connection pool
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    info!("Connecting to database with pool size: {}", config.db_pool_size);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_size)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(&config.postgres_dsn)
        .await?;

    // Test connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;
    info!("Database connection established");

    Ok(pool)
}

/// Create tables, indexes, and the seeded rate-limit rules if absent
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    let schema = r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        email TEXT UNIQUE NOT NULL,
        plan TEXT CHECK (plan IN ('FREE', 'PRO', 'ENTERPRISE')) DEFAULT 'FREE',
        reputation_score FLOAT DEFAULT 1.0,
        created_at TIMESTAMPTZ DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS api_keys (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID REFERENCES users(id) ON DELETE CASCADE,
        api_key TEXT UNIQUE NOT NULL,
        is_active BOOLEAN DEFAULT true,
        created_at TIMESTAMPTZ DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS ip_reputation (
        ip TEXT PRIMARY KEY,
        score FLOAT DEFAULT 100.0,
        total_requests BIGINT DEFAULT 0,
        success_requests BIGINT DEFAULT 0,
        blocked_requests BIGINT DEFAULT 0,
        is_blocked BOOLEAN DEFAULT false,
        is_suspicious BOOLEAN DEFAULT false,
        reason TEXT,
        first_seen TIMESTAMPTZ DEFAULT now(),
        last_seen TIMESTAMPTZ DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS abuse_events (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        ip TEXT,
        user_id UUID,
        event_type TEXT NOT NULL,
        anomaly_score FLOAT DEFAULT 0.0,
        created_at TIMESTAMPTZ DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS rate_limit_rules (
        plan TEXT PRIMARY KEY,
        requests_per_min INT NOT NULL
    );

    INSERT INTO rate_limit_rules (plan, requests_per_min) VALUES
        ('FREE', 100),
        ('PRO', 1000),
        ('ENTERPRISE', 10000)
    ON CONFLICT (plan) DO NOTHING;

    CREATE INDEX IF NOT EXISTS idx_abuse_events_ip ON abuse_events(ip);
    CREATE INDEX IF NOT EXISTS idx_abuse_events_created ON abuse_events(created_at);
    CREATE INDEX IF NOT EXISTS idx_ip_reputation_blocked ON ip_reputation(is_blocked);
    "#;

    sqlx::raw_sql(schema).execute(pool).await?;
    info!("Database schema initialized");

    Ok(())
}
