//! Member sign-in, access checks, and the protected stream resource.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
};
use chrono::{DateTime, Utc};
use gatehouse_core::{ErrorKind, GateError, StreamSettings};
use gatehouse_telemetry::metrics::LOGIN_ACCEPTED;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http::auth::member_token;
use crate::http::constants::MEMBER_COOKIE;
use crate::http::cookies::{clear_cookie, session_cookie};
use crate::http::errors::{ApiError, kind_label};
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    #[serde(alias = "its_id")]
    pub(crate) identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoginResponse {
    pub(crate) token: String,
    pub(crate) identifier: String,
    pub(crate) expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StatusResponse {
    pub(crate) logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) login_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessResponse {
    pub(crate) identifier: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
}

type CookieHeader = [(axum::http::HeaderName, HeaderValue); 1];

/// Country reported by the geolocation collaborator; `XX` means unknown.
pub(crate) fn caller_country(headers: &HeaderMap, header: &str) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("xx"))
        .map(str::to_ascii_uppercase)
}

/// Stale or malformed tokens also expire the client's cookie.
fn member_failure(err: GateError, secure: bool) -> ApiError {
    let clears = matches!(
        err.kind(),
        ErrorKind::Unauthenticated | ErrorKind::Validation
    );
    let api = ApiError::from(err);
    if clears {
        api.clearing(MEMBER_COOKIE, secure)
    } else {
        api
    }
}

fn require_token(state: &ApiState, headers: &HeaderMap) -> Result<String, ApiError> {
    member_token(headers).ok_or_else(|| {
        ApiError::unauthorized(GateError::Unauthenticated.user_message())
            .clearing(MEMBER_COOKIE, state.http.cookie_secure)
    })
}

pub(crate) async fn login(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieHeader, Json<LoginResponse>), ApiError> {
    let Json(request) = payload?;
    let country = caller_country(&headers, &state.http.country_header);

    let session = match state
        .access
        .login(&request.identifier, country.as_deref())
        .await
    {
        Ok(session) => session,
        Err(err) => {
            state.telemetry.inc_login(kind_label(err.kind()));
            if matches!(err, GateError::RegionBlocked { .. }) {
                state.telemetry.inc_region_blocked();
            }
            return Err(err.into());
        }
    };
    state.telemetry.inc_login(LOGIN_ACCEPTED);

    let policy = state.access.sessions().policy();
    let cookie = session_cookie(
        MEMBER_COOKIE,
        session.token.as_str(),
        policy.absolute_ttl,
        state.http.cookie_secure,
    )?;
    let response = LoginResponse {
        token: session.token.as_str().to_string(),
        identifier: session.owner.clone(),
        expires_at: policy.expires_at(&session),
    };
    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

pub(crate) async fn status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Json<StatusResponse> {
    let signed_out = StatusResponse {
        logged_in: false,
        identifier: None,
        login_time: None,
    };
    let Some(token) = member_token(&headers) else {
        return Json(signed_out);
    };
    match state.access.check_access(&token).await {
        Ok(session) => Json(StatusResponse {
            logged_in: true,
            identifier: Some(session.owner),
            login_time: Some(session.created_at),
        }),
        Err(GateError::Storage(err)) => {
            warn!(error = %err.source, "status check degraded to signed-out");
            Json(signed_out)
        }
        Err(_) => Json(signed_out),
    }
}

pub(crate) async fn access(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<AccessResponse>, ApiError> {
    let token = require_token(&state, &headers)?;
    let session = state
        .access
        .check_access(&token)
        .await
        .map_err(|err| member_failure(err, state.http.cookie_secure))?;
    let expires_at = state.access.sessions().policy().expires_at(&session);
    Ok(Json(AccessResponse {
        identifier: session.owner,
        created_at: session.created_at,
        expires_at,
    }))
}

pub(crate) async fn stream(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<StreamSettings>, ApiError> {
    let token = require_token(&state, &headers)?;
    state
        .access
        .check_access(&token)
        .await
        .map_err(|err| member_failure(err, state.http.cookie_secure))?;
    let country = caller_country(&headers, &state.http.country_header);
    if let Err(err) = state.access.admit_region(country.as_deref()).await {
        state.telemetry.inc_region_blocked();
        return Err(err.into());
    }
    Ok(Json(state.access.stream_settings().await))
}

pub(crate) async fn logout(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, CookieHeader), ApiError> {
    if let Some(token) = member_token(&headers) {
        state.access.logout(&token).await?;
    }
    let cookie = clear_cookie(MEMBER_COOKIE, state.http.cookie_secure)?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

pub(crate) async fn logout_all(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, CookieHeader), ApiError> {
    let token = require_token(&state, &headers)?;
    let removed = state
        .access
        .logout_all(&token)
        .await
        .map_err(|err| member_failure(err, state.http.cookie_secure))?;
    info!(removed, "member sessions ended from logout-all");
    let cookie = clear_cookie(MEMBER_COOKIE, state.http.cookie_secure)?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}
