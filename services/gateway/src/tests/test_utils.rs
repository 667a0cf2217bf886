//! Test utilities for gateway tests

use crate::services::AppState;
use axum::body::Body;
use axum::Router;
use gatewarden_common::config::Config;
use http::{Request, Response};

/// Test addresses
pub mod constants {
    pub const TEST_IP: &str = "203.0.113.7";
    pub const TEST_IP_2: &str = "203.0.113.8";
}

/// App state with no Postgres, Redis, or Kafka attached: auth downgrades
/// to anonymous, the rate-limit gate fails open, and events are dropped.
pub fn create_test_app_state() -> AppState {
    AppState::new(None, None, None, Config::default())
}

/// The full router with the complete decision chain
pub fn create_test_router(state: AppState) -> Router {
    crate::handlers::http::create_router(state)
}

/// GET request carrying a forwarded client IP
pub fn get_request(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("user-agent", "gateway-tests/1.0")
        .body(Body::empty())
        .unwrap()
}

/// POST request with a JSON body and forwarded client IP
pub fn post_json_request(uri: &str, ip: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("content-type", "application/json")
        .header("user-agent", "gateway-tests/1.0")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
