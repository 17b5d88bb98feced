//! Session gate for the `/v1` routes.
//!
//! Issuing and verifying sessions belongs to a separate login flow; this
//! module only asks a [`SessionAuthenticator`] whether a request carries one.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::{header, HeaderMap};

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::AppState;

pub trait SessionAuthenticator: Send + Sync {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Accepts requests that carry a non-empty session cookie, or a bearer token
/// from a static allow-list.
#[derive(Debug, Clone)]
pub struct SessionCookieAuthenticator {
    cookie_name: String,
    bearer_tokens: Vec<String>,
}

impl SessionCookieAuthenticator {
    pub fn new(cookie_name: impl Into<String>, bearer_tokens: Vec<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            bearer_tokens,
        }
    }

    fn has_session_cookie(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == self.cookie_name && !value.trim().is_empty())
    }

    fn has_bearer_token(&self, headers: &HeaderMap) -> bool {
        if self.bearer_tokens.is_empty() {
            return false;
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| self.bearer_tokens.iter().any(|t| t == token.trim()))
    }
}

impl SessionAuthenticator for SessionCookieAuthenticator {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        self.has_session_cookie(headers) || self.has_bearer_token(headers)
    }
}

/// Lets every request through. Used when `auth.enabled = false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SessionAuthenticator for AllowAll {
    fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

pub fn authenticator_from_config(config: &AuthConfig) -> std::sync::Arc<dyn SessionAuthenticator> {
    if config.enabled {
        std::sync::Arc::new(SessionCookieAuthenticator::new(
            config.session_cookie.clone(),
            config.bearer_tokens.clone(),
        ))
    } else {
        tracing::warn!("session checks are disabled, registry and log endpoints are open");
        std::sync::Arc::new(AllowAll)
    }
}

pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth.is_authenticated(request.headers()) {
        tracing::debug!(path = %request.uri().path(), "rejected request without session");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn session_cookie_must_be_present_and_non_empty() {
        let auth = SessionCookieAuthenticator::new("session", vec![]);
        assert!(auth.is_authenticated(&headers(header::COOKIE, "theme=dark; session=abc123")));
        assert!(!auth.is_authenticated(&headers(header::COOKIE, "session=")));
        assert!(!auth.is_authenticated(&headers(header::COOKIE, "other=abc")));
        assert!(!auth.is_authenticated(&HeaderMap::new()));
    }

    #[test]
    fn bearer_tokens_from_allow_list() {
        let auth = SessionCookieAuthenticator::new("session", vec!["t0ken".to_string()]);
        assert!(auth.is_authenticated(&headers(header::AUTHORIZATION, "Bearer t0ken")));
        assert!(!auth.is_authenticated(&headers(header::AUTHORIZATION, "Bearer nope")));
    }
}
