//! Decision layers for the request path
//!
//! The chain is a deliberate onion, outermost first: logging wrap ->
//! optional auth -> fingerprint/block gate -> rate-limit gate -> router.
//! Each layer may enrich the request extensions, short-circuit with a
//! response, or observe the downstream outcome; the ordering is
//! load-bearing.

pub mod auth;
pub mod fingerprint;
pub mod logging;
pub mod ratelimit;

pub use auth::{AuthLayer, Identity};
pub use fingerprint::{Fingerprint, FingerprintLayer};
pub use logging::LoggingLayer;
pub use ratelimit::RateLimitLayer;

use crate::services::reputation::canonical_ip;
use axum::extract::ConnectInfo;
use http::header::USER_AGENT;
use http::Request;
use std::net::SocketAddr;

/// Canonical client IP: X-Forwarded-For first hop, then X-Real-IP, then
/// the transport peer address.
pub fn client_ip<B>(req: &Request<B>) -> String {
    if let Some(xff) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return canonical_ip(first);
            }
        }
    }

    if let Some(xri) = req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !xri.is_empty() {
            return canonical_ip(xri);
        }
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// User-Agent header, empty when absent or non-ASCII
pub fn user_agent<B>(req: &Request<B>) -> String {
    req.headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/test");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let req = request_with_headers(&[
            ("x-forwarded-for", "9.9.9.9, 10.0.0.1"),
            ("x-real-ip", "10.0.0.1"),
        ]);
        assert_eq!(client_ip(&req), "9.9.9.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request_with_headers(&[("x-real-ip", "8.8.8.8")]);
        assert_eq!(client_ip(&req), "8.8.8.8");
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut req = request_with_headers(&[]);
        let addr: SocketAddr = "10.0.0.1:12345".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&req), "10.0.0.1");
    }

    #[test]
    fn test_no_source_is_unknown() {
        let req = request_with_headers(&[]);
        assert_eq!(client_ip(&req), "unknown");
    }

    #[test]
    fn test_forwarded_ip_is_canonicalized() {
        let req = request_with_headers(&[("x-forwarded-for", "[2001:db8::1]:443")]);
        assert_eq!(client_ip(&req), "2001:db8::1");
    }

    #[test]
    fn test_user_agent_extraction() {
        let req = request_with_headers(&[("user-agent", "curl/8.0")]);
        assert_eq!(user_agent(&req), "curl/8.0");

        let req = request_with_headers(&[]);
        assert_eq!(user_agent(&req), "");
    }
}
