//! Bearer token authentication.
//! Guards the protected endpoint group.

use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::config::AuthConfig;
use crate::http::server::AppState;

/// Caller identity attached to authenticated requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingCredentials,
    #[error("unknown bearer token")]
    InvalidCredentials,
}

/// Resolves request credentials to an identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Accepts the bearer tokens listed in configuration.
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|entry| (entry.token.clone(), Identity::new(entry.subject.clone())))
            .collect();
        Self { tokens }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }
}

pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.authenticator.authenticate(req.headers()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            warn!(path = %req.uri().path(), reason = %err, "rejected unauthenticated request");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(unauthorized)
    }
}
