//! Fingerprint and reputation gate
//!
//! Derives the canonical client IP, refuses blocked IPs with 403 before
//! any further work, and attaches a stable request fingerprint for
//! correlation. The fingerprint is not a rate-limit key.

use crate::events::{AbuseEvent, EventType};
use crate::middleware::Identity;
use crate::services::AppState;
use axum::body::Body;
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use sha2::{Digest, Sha256};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::info;

/// 256-bit hex digest over client-identifying headers
#[derive(Debug, Clone)]
pub struct Fingerprint(pub String);

/// Fingerprint middleware
#[derive(Clone)]
pub struct FingerprintMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request<Body>> for FingerprintMiddleware<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let state = self.state.clone();

        Box::pin(async move {
            let ip = super::client_ip(&req);

            // The hottest read on the request path: one shared-lock lookup
            if state.reputation.is_blocked(&ip) {
                let user_id = req
                    .extensions()
                    .get::<Identity>()
                    .and_then(|id| id.user_id.clone())
                    .unwrap_or_default();
                let user_agent = super::user_agent(&req);

                info!(ip = %ip, path = %req.uri().path(), "Refusing blocked IP");
                state.emit_event(AbuseEvent::new(
                    &ip,
                    &user_id,
                    EventType::IpBlocked,
                    req.uri().path(),
                    req.method().as_str(),
                    &user_agent,
                ));

                let response = Response::builder()
                    .status(StatusCode::FORBIDDEN)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"error": "ip blocked"}"#))
                    .unwrap();
                return Ok(response);
            }

            let fingerprint = generate_fingerprint(&req, &ip);
            req.extensions_mut().insert(Fingerprint(fingerprint));

            inner.call(req).await
        })
    }
}

/// SHA-256 over (ip, user_agent, accept_language, accept_encoding, accept)
fn generate_fingerprint<B>(req: &Request<B>, ip: &str) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    };

    let components = [
        ip,
        header("user-agent"),
        header("accept-language"),
        header("accept-encoding"),
        header("accept"),
    ];

    let data = components.join("|");
    format!("{:x}", Sha256::digest(data.as_bytes()))
}

/// Layer for fingerprint middleware
#[derive(Clone)]
pub struct FingerprintLayer {
    state: AppState,
}

impl FingerprintLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for FingerprintLayer {
    type Service = FingerprintMiddleware<S>;

    fn layer(&self, service: S) -> Self::Service {
        FingerprintMiddleware {
            inner: service,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ua: &str, accept: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/test")
            .header("user-agent", ua)
            .header("accept", accept)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = generate_fingerprint(&request("curl/8.0", "*/*"), "1.2.3.4");
        let b = generate_fingerprint(&request("curl/8.0", "*/*"), "1.2.3.4");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_varies_with_inputs() {
        let base = generate_fingerprint(&request("curl/8.0", "*/*"), "1.2.3.4");
        let other_ua = generate_fingerprint(&request("wget/1.21", "*/*"), "1.2.3.4");
        let other_ip = generate_fingerprint(&request("curl/8.0", "*/*"), "4.3.2.1");
        assert_ne!(base, other_ua);
        assert_ne!(base, other_ip);
    }

    #[test]
    fn test_fingerprint_matches_known_digest() {
        // sha256("1.2.3.4||||") for a request with no identifying headers
        let req = Request::builder()
            .uri("/api/test")
            .body(Body::empty())
            .unwrap();
        let fp = generate_fingerprint(&req, "1.2.3.4");

        let expected = format!("{:x}", Sha256::digest("1.2.3.4||||".as_bytes()));
        assert_eq!(fp, expected);
    }
}
