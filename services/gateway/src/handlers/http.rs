//! Router assembly, health, and service endpoints

use crate::handlers::admin;
use crate::middleware::{AuthLayer, FingerprintLayer, LoggingLayer, RateLimitLayer};
use crate::services::AppState;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with the full decision chain
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/admin/blocked-ips",
            get(admin::get_blocked_ips).post(admin::block_ip),
        )
        .route("/admin/unblock", post(admin::unblock_ip))
        .route("/admin/ip-risk", get(admin::get_ip_risk))
        .route("/admin/abuse-events", get(admin::get_abuse_events))
        .route("/admin/metrics", get(admin::get_traffic_metrics))
        .route("/admin/recent-requests", get(admin::get_recent_requests))
        .route("/admin/all-ips", get(admin::get_all_ips))
        .route("/admin/suspicious-ips", get(admin::get_suspicious_ips));

    let router = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .merge(admin)
        .route("/api", any(proxy_api))
        .route("/api/*path", any(proxy_api))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state.clone());

    // Decision chain; the last layer added is the outermost, so requests
    // flow logging -> auth -> fingerprint -> rate limit -> routes.
    router
        .layer(RateLimitLayer::new(state.clone()))
        .layer(FingerprintLayer::new(state.clone()))
        .layer(AuthLayer::optional(state.clone()))
        .layer(LoggingLayer::new(state))
}

/// Service card served at /
async fn service_info() -> Response {
    Json(json!({
        "service": "API Rate-Limit & Abuse Detection Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/*",
            "admin": {
                "blocked_ips": "/admin/blocked-ips",
                "unblock": "/admin/unblock",
                "ip_risk": "/admin/ip-risk",
                "abuse_events": "/admin/abuse-events",
                "metrics": "/admin/metrics"
            }
        }
    }))
    .into_response()
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Response {
    let stats = state.traffic.snapshot();
    Json(json!({
        "status": "healthy",
        "service": "api-gateway",
        "total_requests": stats.total_requests,
        "blocked_requests": stats.blocked_requests,
        "uptime": "running",
    }))
    .into_response()
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let body = gatewarden_common::metrics::encode_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Forward /api/* to the backend, or answer a stub when none is configured
async fn proxy_api(State(state): State<AppState>, req: Request) -> Response {
    match &state.proxy {
        Some(proxy) => proxy.forward(req).await,
        None => Json(json!({
            "message": "API Gateway is running",
            "path": req.uri().path(),
        }))
        .into_response(),
    }
}
