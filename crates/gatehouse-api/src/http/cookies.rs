//! Session cookie rendering and parsing.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
use chrono::Duration as ChronoDuration;

use crate::http::errors::ApiError;

/// `Set-Cookie` value carrying `token` for `max_age`.
pub(crate) fn session_cookie(
    name: &str,
    token: &str,
    max_age: ChronoDuration,
    secure: bool,
) -> Result<HeaderValue, ApiError> {
    render(name, token, max_age.num_seconds().max(0), secure)
}

/// `Set-Cookie` value that expires `name` immediately.
pub(crate) fn clear_cookie(name: &str, secure: bool) -> Result<HeaderValue, ApiError> {
    render(name, "", 0, secure)
}

fn render(name: &str, value: &str, max_age: i64, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::try_from(cookie).map_err(|_| ApiError::internal("failed to encode cookie"))
}

/// Value of cookie `name` across every `Cookie` header, if present and non-empty.
pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_attributes() -> anyhow::Result<()> {
        let cookie = session_cookie("session_token", "abc", ChronoDuration::hours(24), true)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let text = cookie.to_str()?;
        assert!(text.starts_with("session_token=abc;"));
        assert!(text.contains("Max-Age=86400"));
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("SameSite=Lax"));
        assert!(text.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> anyhow::Result<()> {
        let cookie =
            clear_cookie("admin_token", false).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let text = cookie.to_str()?;
        assert!(text.starts_with("admin_token=;"));
        assert!(text.contains("Max-Age=0"));
        assert!(!text.contains("Secure"));
        Ok(())
    }

    #[test]
    fn read_cookie_scans_all_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; session_token="));
        headers.append(
            COOKIE,
            HeaderValue::from_static("admin_token=xyz; session_token=tok"),
        );
        assert_eq!(read_cookie(&headers, "session_token").as_deref(), Some("tok"));
        assert_eq!(read_cookie(&headers, "admin_token").as_deref(), Some("xyz"));
        assert!(read_cookie(&headers, "missing").is_none());
    }
}
