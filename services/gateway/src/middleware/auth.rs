//! Identity resolution middleware
//!
//! Resolves the caller to {user_id, plan} from an API key or a bearer
//! token. The optional variant never fails the request: anything that does
//! not authenticate cleanly downgrades to anonymous with plan FREE. The
//! strict variant answers 401 and emits an AUTH_FAILURE event instead.

use crate::events::{AbuseEvent, EventType};
use crate::models::Plan;
use crate::repository::{ApiKeyRepository, UserRepository};
use crate::services::AppState;
use axum::body::Body;
use futures::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};
use uuid::Uuid;

/// Caller identity attached to the request context by this layer and
/// never mutated downstream
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub plan: Plan,
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Bearer-token claims under the shared HMAC secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: usize,
}

/// Verify a bearer token and return its claims
pub fn decode_bearer(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

/// Authentication middleware
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    state: AppState,
    strict: bool,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
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
        let strict = self.strict;

        let api_key = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .filter(|k| !k.is_empty())
            .map(|s| s.to_string());
        let bearer_token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|s| s.to_string());

        Box::pin(async move {
            match resolve_identity(&state, api_key.as_deref(), bearer_token.as_deref()).await {
                Some(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                None if strict => {
                    let ip = super::client_ip(&req);
                    let user_agent = super::user_agent(&req);
                    warn!(ip = %ip, path = %req.uri().path(), "Unauthorized request");
                    state.emit_event(AbuseEvent::new(
                        &ip,
                        "",
                        EventType::AuthFailure,
                        req.uri().path(),
                        req.method().as_str(),
                        &user_agent,
                    ));

                    let response = Response::builder()
                        .status(StatusCode::UNAUTHORIZED)
                        .header(CONTENT_TYPE, "application/json")
                        .body(Body::from(r#"{"error": "unauthorized"}"#))
                        .unwrap();
                    Ok(response)
                }
                None => {
                    req.extensions_mut().insert(Identity::default());
                    inner.call(req).await
                }
            }
        })
    }
}

/// Resolve the caller, or None when nothing authenticates
async fn resolve_identity(
    state: &AppState,
    api_key: Option<&str>,
    bearer_token: Option<&str>,
) -> Option<Identity> {
    let Some(db) = &state.db else {
        return None;
    };

    if let Some(api_key) = api_key {
        let key_repo = ApiKeyRepository::new(db.clone());
        match key_repo.validate_key(api_key).await {
            Ok((user_id, true)) => {
                let user_repo = UserRepository::new(db.clone());
                if let Ok(user) = user_repo.get_by_id(user_id).await {
                    return Some(Identity {
                        user_id: Some(user.id.to_string()),
                        api_key: Some(api_key.to_string()),
                        plan: user.plan,
                    });
                }
            }
            Ok((_, false)) => debug!("Inactive API key presented"),
            Err(e) => debug!(error = %e, "API key lookup failed"),
        }
    }

    if let Some(token) = bearer_token {
        match decode_bearer(token, &state.config.jwt_secret) {
            Ok(claims) => {
                if let Ok(user_id) = Uuid::parse_str(&claims.user_id) {
                    let user_repo = UserRepository::new(db.clone());
                    if let Ok(user) = user_repo.get_by_id(user_id).await {
                        return Some(Identity {
                            user_id: Some(claims.user_id),
                            api_key: None,
                            plan: user.plan,
                        });
                    }
                }
            }
            Err(e) => debug!(error = %e, "Bearer token rejected"),
        }
    }

    None
}

/// Layer for authentication middleware
#[derive(Clone)]
pub struct AuthLayer {
    state: AppState,
    strict: bool,
}

impl AuthLayer {
    /// Optional-auth variant: unauthenticated traffic passes as anonymous
    pub fn optional(state: AppState) -> Self {
        Self {
            state,
            strict: false,
        }
    }

    /// Strict variant: missing or invalid credentials answer 401
    pub fn strict(state: AppState) -> Self {
        Self {
            state,
            strict: true,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, service: S) -> Self::Service {
        AuthMiddleware {
            inner: service,
            state: self.state.clone(),
            strict: self.strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(user_id: &str, secret: &str, exp_offset: i64) -> String {
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_bearer_roundtrip() {
        let token = make_token("user-123", "test-secret", 3600);
        let claims = decode_bearer(&token, "test-secret").unwrap();
        assert_eq!(claims.user_id, "user-123");
    }

    #[test]
    fn test_bearer_rejects_wrong_secret() {
        let token = make_token("user-123", "test-secret", 3600);
        assert!(decode_bearer(&token, "other-secret").is_err());
    }

    #[test]
    fn test_bearer_rejects_expired_token() {
        let token = make_token("user-123", "test-secret", -3600);
        assert!(decode_bearer(&token, "test-secret").is_err());
    }

    #[test]
    fn test_bearer_rejects_garbage() {
        assert!(decode_bearer("not-a-token", "test-secret").is_err());
    }

    #[test]
    fn test_anonymous_identity_defaults_to_free() {
        let identity = Identity::default();
        assert!(!identity.is_authenticated());
        assert_eq!(identity.plan, Plan::Free);
        assert!(identity.api_key.is_none());
    }
}
