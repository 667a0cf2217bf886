//! Rate-limit gate
//!
//! Keys the sliding window by identity (user id for authenticated callers,
//! client IP otherwise), consults the distributed limiter, and emits the
//! X-RateLimit-* headers. If the rate store is unreachable the gate fails
//! open: availability of the backend is preferred over a hard dependency
//! on Redis. Deployments needing fail-closed semantics change this here.

use crate::events::{AbuseEvent, EventType};
use crate::middleware::Identity;
use crate::models::{Plan, RateLimitInfo};
use crate::repository::UserRepository;
use crate::services::AppState;
use axum::body::Body;
use futures::future::BoxFuture;
use gatewarden_common::metrics;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::warn;

/// TTL for cached per-plan limits
const LIMIT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Bucket key for one caller and path
pub fn bucket_key(user_id: Option<&str>, ip: &str, path: &str, key_by_path: bool) -> String {
    match (user_id, key_by_path) {
        (Some(id), true) => format!("rate:user:{}:{}", id, path),
        (Some(id), false) => format!("rate:user:{}", id),
        (None, true) => format!("rate:ip:{}:{}", ip, path),
        (None, false) => format!("rate:ip:{}", ip),
    }
}

/// Rate limiting middleware
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let state = self.state.clone();

        Box::pin(async move {
            // Fail open when no rate store is configured
            let Some(limiter) = state.limiter.clone() else {
                return inner.call(req).await;
            };

            let ip = super::client_ip(&req);
            let identity = req
                .extensions()
                .get::<Identity>()
                .cloned()
                .unwrap_or_default();
            let path = req.uri().path().to_string();

            let limit = lookup_limit(&state, identity.plan).await;
            let key = bucket_key(
                identity.user_id.as_deref(),
                &ip,
                &path,
                state.config.rate_limit_key_by_path,
            );

            let decision = match limiter.check(&key, limit).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "Rate-limit store unreachable, failing open");
                    metrics::RATE_LIMIT_DECISIONS_TOTAL
                        .with_label_values(&["fail_open"])
                        .inc();
                    return inner.call(req).await;
                }
            };

            let window = limiter.window_seconds();
            let info = RateLimitInfo {
                limit,
                remaining: decision.remaining(),
                reset_at: chrono::Utc::now().timestamp() + window as i64,
            };

            if !decision.allowed {
                metrics::RATE_LIMIT_DECISIONS_TOTAL
                    .with_label_values(&["deny"])
                    .inc();

                let user_agent = super::user_agent(&req);
                state.emit_event(AbuseEvent::new(
                    &ip,
                    identity.user_id.as_deref().unwrap_or(""),
                    EventType::RateLimitExceeded,
                    &path,
                    req.method().as_str(),
                    &user_agent,
                ));

                let body = format!(
                    r#"{{"error": "rate limit exceeded", "retry_after": {}}}"#,
                    window
                );
                let mut response = Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .header(CONTENT_TYPE, "application/json")
                    .header("retry-after", HeaderValue::from(window))
                    .body(Body::from(body))
                    .unwrap();
                set_rate_limit_headers(&mut response, &info);
                return Ok(response);
            }

            metrics::RATE_LIMIT_DECISIONS_TOTAL
                .with_label_values(&["allow"])
                .inc();

            let mut response = inner.call(req).await?;
            set_rate_limit_headers(&mut response, &info);
            Ok(response)
        })
    }
}

fn set_rate_limit_headers(response: &mut Response<Body>, info: &RateLimitInfo) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit.max(0) as u64));
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from(info.remaining.max(0) as u64),
    );
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(info.reset_at.max(0) as u64),
    );
}

/// Per-plan limit: cache, then rules table, then hard-coded fallback
async fn lookup_limit(state: &AppState, plan: Plan) -> i64 {
    let cache_key = format!("limit:{}", plan.as_str());

    if let Some(cache) = &state.cache {
        if let Ok(Some(limit)) = cache.get::<i64>(&cache_key).await {
            return limit;
        }
    }

    if let Some(db) = &state.db {
        let repo = UserRepository::new(db.clone());
        if let Ok(limit) = repo.rate_limit_for_plan(plan).await {
            if let Some(cache) = &state.cache {
                let _ = cache.set(&cache_key, &limit, LIMIT_CACHE_TTL).await;
            }
            return limit;
        }
    }

    plan.fallback_limit(state.config.rate_limit_max)
}

/// Layer for rate limiting middleware
#[derive(Clone)]
pub struct RateLimitLayer {
    state: AppState,
}

impl RateLimitLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitMiddleware {
            inner: service,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_authenticated() {
        let key = bucket_key(Some("user-1"), "1.2.3.4", "/api/orders", true);
        assert_eq!(key, "rate:user:user-1:/api/orders");
    }

    #[test]
    fn test_bucket_key_anonymous() {
        let key = bucket_key(None, "1.2.3.4", "/api/orders", true);
        assert_eq!(key, "rate:ip:1.2.3.4:/api/orders");
    }

    #[test]
    fn test_bucket_key_without_path() {
        assert_eq!(bucket_key(Some("user-1"), "1.2.3.4", "/api/orders", false), "rate:user:user-1");
        assert_eq!(bucket_key(None, "1.2.3.4", "/api/orders", false), "rate:ip:1.2.3.4");
    }

    #[test]
    fn test_distinct_paths_get_distinct_buckets() {
        let a = bucket_key(None, "1.2.3.4", "/api/a", true);
        let b = bucket_key(None, "1.2.3.4", "/api/b", true);
        assert_ne!(a, b);
    }
}
