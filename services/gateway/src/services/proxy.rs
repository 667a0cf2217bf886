//! Single-host reverse proxy for /api/* traffic
//!
//! Backend status codes pass through untouched; only a transport-level
//! failure is rewritten to 502.

use axum::body::Body;
use gatewarden_common::error::{Error, Result};
use http::header::{HeaderName, CONTENT_TYPE, HOST};
use http::{HeaderValue, Request, Response, StatusCode};
use std::time::Duration;
use tracing::error;

/// Hop-by-hop headers that must not be forwarded in either direction
const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_header(name: &HeaderName) -> bool {
    HOP_HEADERS.contains(&name.as_str())
}

pub struct ReverseProxy {
    client: reqwest::Client,
    target: reqwest::Url,
}

impl ReverseProxy {
    pub fn new(target_url: &str) -> Result<Self> {
        let target = reqwest::Url::parse(target_url)
            .map_err(|e| Error::validation(format!("Invalid backend URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::internal(format!("Proxy client build failed: {}", e)))?;

        Ok(Self { client, target })
    }

    /// Forward one request to the backend and relay its response
    pub async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let (parts, body) = req.into_parts();

        let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to read request body for forwarding");
                return bad_gateway();
            }
        };

        let mut url = self.target.clone();
        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, url);
        for (name, value) in parts.headers.iter() {
            if is_hop_header(name) || name == HOST {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let upstream = match builder.body(body_bytes.to_vec()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "Backend request failed");
                return bad_gateway();
            }
        };

        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = upstream.headers().clone();
        let bytes = upstream.bytes().await.unwrap_or_default();

        let mut builder = Response::builder().status(status);
        for (name, value) in headers.iter() {
            if HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let mut response = builder
            .body(Body::from(bytes))
            .unwrap_or_else(|_| bad_gateway());
        response
            .headers_mut()
            .insert("x-proxy", HeaderValue::from_static("API-Gateway"));
        response
    }
}

fn bad_gateway() -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"error": "backend service unavailable"}"#))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_backend_url() {
        assert!(ReverseProxy::new("not a url").is_err());
        assert!(ReverseProxy::new("http://localhost:9000").is_ok());
    }

    #[test]
    fn test_hop_headers_not_forwarded() {
        assert!(is_hop_header(&HeaderName::from_static("transfer-encoding")));
        assert!(is_hop_header(&HeaderName::from_static("connection")));
        assert!(!is_hop_header(&HeaderName::from_static("content-type")));
        assert!(!is_hop_header(&HeaderName::from_static("authorization")));
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_502() {
        // Port 9 is the discard port; nothing listens there in tests
        let proxy = ReverseProxy::new("http://127.0.0.1:9").unwrap();
        let req = Request::builder()
            .method("GET")
            .uri("/api/test")
            .body(Body::empty())
            .unwrap();

        let response = proxy.forward(req).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "backend service unavailable");
    }
}
