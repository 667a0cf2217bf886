//! Service layer for the gateway

use crate::events::{AbuseEvent, EventProducer};
use crate::repository::IpReputationRepository;
use deadpool_redis::Pool as RedisPool;
use gatewarden_common::{config::Config, ratelimit::SlidingWindowLimiter, redis::CacheService};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

pub mod proxy;
pub mod reputation;
pub mod traffic;

use proxy::ReverseProxy;
use reputation::ReputationEngine;
use traffic::TrafficLog;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub cache: Option<CacheService>,
    pub config: Arc<Config>,
    pub reputation: Arc<ReputationEngine>,
    pub traffic: Arc<TrafficLog>,
    pub limiter: Option<Arc<SlidingWindowLimiter>>,
    pub producer: Option<Arc<EventProducer>>,
    pub proxy: Option<Arc<ReverseProxy>>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        db: Option<PgPool>,
        redis: Option<RedisPool>,
        producer: Option<Arc<EventProducer>>,
        config: Config,
    ) -> Self {
        let cache = redis
            .clone()
            .map(|pool| CacheService::new(pool, "gatewarden"));
        let limiter = redis
            .map(|pool| Arc::new(SlidingWindowLimiter::new(pool, config.rate_limit_window)));

        let reputation = Arc::new(ReputationEngine::new(
            db.clone().map(IpReputationRepository::new),
        ));

        let proxy = match ReverseProxy::new(&config.backend_url) {
            Ok(proxy) => Some(Arc::new(proxy)),
            Err(e) => {
                warn!(error = %e, "Failed to create reverse proxy, /api/* will answer a stub");
                None
            }
        };

        Self {
            db,
            cache,
            config: Arc::new(config),
            reputation,
            traffic: Arc::new(TrafficLog::new()),
            limiter,
            producer,
            proxy,
        }
    }

    /// Publish an abuse event off the request path. Publish failures are
    /// logged and absorbed; the HTTP response never waits on the bus.
    pub fn emit_event(&self, event: AbuseEvent) {
        let Some(producer) = &self.producer else {
            return;
        };
        let producer = Arc::clone(producer);
        tokio::spawn(async move {
            if let Err(e) = producer.publish(&event).await {
                warn!(
                    error = %e,
                    event_type = event.event_type.as_str(),
                    "Failed to publish abuse event"
                );
            }
        });
    }
}
