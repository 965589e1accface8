use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Hash a token with SHA-256 so lookups compare fixed-length hex digests
/// instead of the raw secret.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;

/// Set of accepted session tokens, stored hashed.
///
/// An empty verifier means development mode: every request passes.
#[derive(Debug, Clone, Default)]
pub struct SessionVerifier {
    token_hashes: HashSet<String>,
}

impl SessionVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let token_hashes = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| hash_token(&t))
            .collect();
        Self { token_hashes }
    }

    pub fn is_enabled(&self) -> bool {
        !self.token_hashes.is_empty()
    }

    pub fn verify(&self, token: &str) -> bool {
        self.token_hashes.contains(&hash_token(token))
    }
}

/// Session authentication for user-facing endpoints.
///
/// Accepts the token from:
/// 1. `X-Session-Token` header
/// 2. `Authorization: Bearer <token>` header
///
/// Skipped entirely when no session tokens are configured.
pub async fn session_middleware(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.sessions.is_enabled() {
        return Ok(next.run(request).await);
    }

    let token = extract_session_token(&headers)?;
    if !state.sessions.verify(&token) {
        tracing::warn!(
            "Rejected session token {} on {}",
            mask_token(&token),
            request.uri().path()
        );
        return Err(AuthError::InvalidToken);
    }

    tracing::debug!("Session {} accepted", mask_token(&token));
    Ok(next.run(request).await)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(token) = headers.get("X-Session-Token") {
        if let Ok(token) = token.to_str() {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }

    if let Some(auth) = headers.get("Authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err(AuthError::MissingToken)
}

/// Mask a token for logging (first 4 and last 4 characters)
pub(crate) fn mask_token(token: &str) -> String {
    if token.len() <= 8 || !token.is_ascii() {
        return "****".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing session token"),
            AuthError::InvalidToken => write!(f, "Invalid session token"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => {
                "Unauthorized. Provide a session via X-Session-Token or Authorization: Bearer header."
            }
            AuthError::InvalidToken => "Unauthorized. Session is invalid or expired.",
        };

        (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
    }
}
