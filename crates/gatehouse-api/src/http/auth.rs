//! Token extraction and the administrator guard.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::http::constants::{
    ADMIN_COOKIE, BEARER_PREFIX, HEADER_ADMIN_TOKEN, HEADER_MEMBER_TOKEN, MEMBER_COOKIE,
};
use crate::http::cookies::read_cookie;
use crate::http::errors::ApiError;
use crate::state::ApiState;

/// Authenticated administrator attached to guarded requests.
#[derive(Debug, Clone)]
pub(crate) struct AdminContext {
    pub(crate) username: String,
    pub(crate) token: String,
}

/// Member token from the dedicated header, a bearer credential, or the cookie.
pub(crate) fn member_token(headers: &HeaderMap) -> Option<String> {
    extract_token(headers, HEADER_MEMBER_TOKEN, MEMBER_COOKIE)
}

/// Administrator token from the dedicated header, a bearer credential, or the cookie.
pub(crate) fn admin_token(headers: &HeaderMap) -> Option<String> {
    extract_token(headers, HEADER_ADMIN_TOKEN, ADMIN_COOKIE)
}

fn extract_token(headers: &HeaderMap, header: &str, cookie: &str) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| bearer_token(headers))
        .or_else(|| read_cookie(headers, cookie))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) async fn require_admin(
    State(state): State<Arc<ApiState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let secure = state.http.cookie_secure;
    let Some(token) = admin_token(req.headers()) else {
        return Err(ApiError::unauthorized("administrator sign-in required"));
    };
    let session = state
        .admin
        .authorize(&token)
        .await
        .map_err(|err| ApiError::from(err).clearing(ADMIN_COOKIE, secure))?;
    debug!(username = %session.owner, "administrator request authorized");

    req.extensions_mut().insert(AdminContext {
        username: session.owner,
        token,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    #[test]
    fn dedicated_header_wins_over_bearer_and_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_MEMBER_TOKEN, HeaderValue::from_static("from-header"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        headers.insert(COOKIE, HeaderValue::from_static("session_token=from-cookie"));
        assert_eq!(member_token(&headers).as_deref(), Some("from-header"));

        headers.remove(HEADER_MEMBER_TOKEN);
        assert_eq!(member_token(&headers).as_deref(), Some("from-bearer"));

        headers.remove(AUTHORIZATION);
        assert_eq!(member_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn namespaces_read_their_own_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session_token=member"));
        assert!(admin_token(&headers).is_none());
        assert_eq!(member_token(&headers).as_deref(), Some("member"));
    }

    #[test]
    fn blank_credentials_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ADMIN_TOKEN, HeaderValue::from_static("   "));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(admin_token(&headers).is_none());
    }
}
