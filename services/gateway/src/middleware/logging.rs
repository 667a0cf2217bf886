//! Logging wrap and post-response accounting
//!
//! The outermost decorator. After the response is written it appends the
//! request to the recent-requests ring, updates traffic stats, feeds the
//! reputation engine, and records metrics. The reputation engine persists
//! itself on a background task; this layer never awaits persistence.

use crate::services::AppState;
use axum::body::Body;
use futures::future::BoxFuture;
use gatewarden_common::metrics;
use http::{Request, Response, StatusCode};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, Instrument};

/// Logging middleware
#[derive(Clone)]
pub struct LoggingMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request<Body>> for LoggingMiddleware<S>
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

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let ip = super::client_ip(&req);
        let user_agent = super::user_agent(&req);
        let start = Instant::now();

        let span = info_span!("http_request", method = %method, path = %path, ip = %ip);

        Box::pin(
            async move {
                let response = inner.call(req).await?;

                let status = response.status();
                let latency_ms = start.elapsed().as_millis() as i64;
                let blocked = status == StatusCode::TOO_MANY_REQUESTS;

                let request_id = state.traffic.record(
                    &ip,
                    &path,
                    &method,
                    &user_agent,
                    status.as_u16(),
                    latency_ms,
                    blocked,
                );
                state.reputation.record_request(&ip, &user_agent, blocked);

                metrics::HTTP_REQUESTS_TOTAL
                    .with_label_values(&[&method, status.as_str()])
                    .inc();
                metrics::HTTP_REQUEST_DURATION_SECONDS
                    .with_label_values(&[&method])
                    .observe(start.elapsed().as_secs_f64());

                info!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    latency_ms,
                    user_agent = %user_agent,
                    "Request completed"
                );

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Layer for logging middleware
#[derive(Clone)]
pub struct LoggingLayer {
    state: AppState,
}

impl LoggingLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingMiddleware<S>;

    fn layer(&self, service: S) -> Self::Service {
        LoggingMiddleware {
            inner: service,
            state: self.state.clone(),
        }
    }
}
