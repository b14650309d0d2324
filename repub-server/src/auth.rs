//! Bearer token authentication middleware
//!
//! Every package route requires `Authorization: Bearer <token>`. Read routes
//! accept read and write tokens, publish routes only write tokens. The name of
//! the matching token is attached to the request as its [`Identity`].

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    config::{AuthConfig, TokenConfig},
    error::AppError,
    state::AppState,
};

/// Authenticated caller, available to handlers as an `Extension`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Access level granted by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Read,
    Write,
}

/// Compare two byte strings without short-circuiting on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn find_token<'a>(tokens: &'a [TokenConfig], presented: &str) -> Option<&'a TokenConfig> {
    // No early exit after a match
    tokens.iter().fold(None, |found, token| {
        let matches = constant_time_eq(token.value.as_bytes(), presented.as_bytes());
        found.or(matches.then_some(token))
    })
}

/// Resolve a presented token to its identity and highest scope.
pub fn authenticate(auth: &AuthConfig, presented: &str) -> Option<(Identity, Scope)> {
    if let Some(token) = find_token(&auth.write_tokens, presented) {
        return Some((Identity(token.name.clone()), Scope::Write));
    }
    find_token(&auth.read_tokens, presented).map(|token| (Identity(token.name.clone()), Scope::Read))
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn require_scope(
    state: &AppState,
    mut req: Request,
    next: Next,
    required: Scope,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let (identity, scope) = authenticate(&state.config.auth, &token)
        .ok_or_else(|| AppError::Unauthorized("Invalid access token".to_string()))?;

    if scope < required {
        return Err(AppError::Forbidden(format!(
            "token {} is not allowed to publish packages",
            identity.name()
        )));
    }

    debug!(identity = identity.name(), scope = ?scope, "Request authenticated");
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Middleware guarding read-only package routes
pub async fn require_read(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_scope(&state, req, next, Scope::Read).await
}

/// Middleware guarding the publish routes
pub async fn require_write(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_scope(&state, req, next, Scope::Write).await
}
