// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the gateway.
//!
//! When a token is configured, `/api/*` requires `Authorization: Bearer <token>`
//! and `/ws` accepts either that header or a `?token=` query parameter.
//! Without a token every route is open, which suits a loopback-only bind.

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. `None` disables authentication.
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// True when auth is disabled or `candidate` equals the configured token.
    pub fn accepts(&self, candidate: Option<&str>) -> bool {
        match (&self.bearer_token, candidate) {
            (None, _) => true,
            (Some(expected), Some(token)) => token == expected,
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Middleware that rejects requests without the configured bearer token.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.accepts(bearer_from_headers(request.headers())) {
        return Ok(next.run(request).await);
    }

    tracing::debug!(path = %request.uri().path(), "rejected request without valid bearer token");
    Err(StatusCode::UNAUTHORIZED)
}

/// Query string accepted on the WebSocket handshake.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Like [`auth_middleware`], but browsers cannot set headers on a WebSocket
/// handshake, so `?token=` is accepted as well.
pub async fn ws_auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let query = Query::<TokenQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let token = bearer_from_headers(request.headers()).or(query.token.as_deref());
    if auth.accepts(token) {
        return Ok(next.run(request).await);
    }

    tracing::debug!("rejected WebSocket handshake without valid token");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn disabled_auth_accepts_anything() {
        let auth = AuthConfig::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.accepts(None));
        assert!(auth.accepts(Some("whatever")));
    }

    #[test]
    fn blank_token_disables_auth() {
        assert!(!AuthConfig::new(Some("  ".into())).is_enabled());
    }

    #[test]
    fn enabled_auth_requires_exact_token() {
        let auth = AuthConfig::new(Some("secret-token".into()));
        assert!(auth.accepts(Some("secret-token")));
        assert!(!auth.accepts(Some("secret")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_from_headers(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_from_headers(&headers), Some("abc"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_from_headers(&headers), None);
    }

    #[test]
    fn debug_redacts_token() {
        let auth = AuthConfig::new(Some("secret-token".into()));
        let debug = format!("{auth:?}");
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("secret-token"));
    }
}
