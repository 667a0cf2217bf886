//! Administrative read-outs and block controls
//!
//! All endpoints speak JSON. The in-memory reputation engine is
//! authoritative for every projection here; Postgres is consulted only
//! for stored abuse events.

use crate::repository::AbuseEventRepository;
use crate::services::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use validator::Validate;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct IpQuery {
    ip: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BlockIpRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "ip is required"))]
    ip: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnblockIpRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "ip is required"))]
    ip: String,
}

/// GET /admin/blocked-ips
pub async fn get_blocked_ips(State(state): State<AppState>) -> Response {
    let ips = state.reputation.blocked_list();
    let count = ips.len();
    Json(json!({ "blocked_ips": ips, "count": count })).into_response()
}

/// POST /admin/blocked-ips
pub async fn block_ip(
    State(state): State<AppState>,
    payload: Result<Json<BlockIpRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request body");
    };
    if req.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "ip is required");
    }

    let reputation = state.reputation.manual_block(&req.ip, req.reason);
    Json(json!({
        "message": "ip blocked successfully",
        "ip": req.ip,
        "reputation": reputation,
    }))
    .into_response()
}

/// POST /admin/unblock
pub async fn unblock_ip(
    State(state): State<AppState>,
    payload: Result<Json<UnblockIpRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request body");
    };
    if req.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "ip is required");
    }

    state.reputation.manual_unblock(&req.ip);
    Json(json!({
        "message": "ip unblocked successfully",
        "ip": req.ip,
    }))
    .into_response()
}

/// GET /admin/ip-risk?ip=
pub async fn get_ip_risk(State(state): State<AppState>, Query(query): Query<IpQuery>) -> Response {
    let Some(ip) = query.ip.filter(|ip| !ip.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "ip parameter is required");
    };

    let rep = state.reputation.get(&ip);
    Json(json!({
        "ip": rep.ip,
        "reputation_score": rep.score,
        "is_blocked": rep.is_blocked,
        "is_suspicious": rep.is_suspicious,
        "total_requests": rep.total_requests,
        "blocked_requests": rep.blocked_requests,
        "last_seen": rep.last_seen,
        "first_seen": rep.first_seen,
        "user_agents": rep.user_agents,
        "reason": rep.reason,
    }))
    .into_response()
}

/// GET /admin/abuse-events?ip=
///
/// Stored events when Postgres is attached; otherwise the recent-request
/// ring filtered to the IP.
pub async fn get_abuse_events(
    State(state): State<AppState>,
    Query(query): Query<IpQuery>,
) -> Response {
    let Some(ip) = query.ip.filter(|ip| !ip.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "ip parameter is required");
    };

    if let Some(db) = &state.db {
        let repo = AbuseEventRepository::new(db.clone());
        match repo.get_by_ip(&ip, 100).await {
            Ok(events) => {
                let count = events.len();
                return Json(json!({ "ip": ip, "events": events, "count": count }))
                    .into_response();
            }
            Err(e) => warn!(error = %e, "Stored abuse-event lookup failed, using recent requests"),
        }
    }

    let requests: Vec<_> = state
        .traffic
        .recent()
        .into_iter()
        .filter(|log| log.ip.contains(&ip))
        .collect();
    let count = requests.len();
    Json(json!({ "ip": ip, "requests": requests, "count": count })).into_response()
}

/// GET /admin/metrics
pub async fn get_traffic_metrics(State(state): State<AppState>) -> Response {
    let stats = state.traffic.snapshot();
    Json(json!({
        "total_blocked_ips": state.reputation.blocked_count(),
        "total_requests": stats.total_requests,
        "success_requests": stats.success_requests,
        "blocked_requests": stats.blocked_requests,
        "avg_latency_ms": stats.avg_latency_ms,
        "status": "healthy",
    }))
    .into_response()
}

/// GET /admin/recent-requests
pub async fn get_recent_requests(State(state): State<AppState>) -> Response {
    let requests = state.traffic.recent();
    let count = requests.len();
    Json(json!({ "requests": requests, "count": count })).into_response()
}

/// GET /admin/all-ips
pub async fn get_all_ips(State(state): State<AppState>) -> Response {
    let ips = state.reputation.all();
    let count = ips.len();
    Json(json!({ "ips": ips, "count": count })).into_response()
}

/// GET /admin/suspicious-ips
pub async fn get_suspicious_ips(State(state): State<AppState>) -> Response {
    let ips = state.reputation.suspicious();
    let count = ips.len();
    Json(json!({ "ips": ips, "count": count })).into_response()
}
