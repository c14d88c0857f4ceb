//! Administrator sign-in and the mutation surface.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode, header::SET_COOKIE},
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
    DashboardSnapshot, GeoPolicy, GeoPolicyPatch, StreamSettings, StreamSettingsPatch,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http::auth::AdminContext;
use crate::http::constants::ADMIN_COOKIE;
use crate::http::cookies::{clear_cookie, session_cookie};
use crate::http::errors::ApiError;
use crate::state::ApiState;

type CookieHeader = [(HeaderName, HeaderValue); 1];

#[derive(Debug, Deserialize)]
pub(crate) struct AdminLoginRequest {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AdminLoginResponse {
    pub(crate) token: String,
    pub(crate) expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddIdentifierRequest {
    #[serde(alias = "its_id")]
    pub(crate) identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AddIdentifierResponse {
    pub(crate) added: bool,
    pub(crate) identifier: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkAddRequest {
    #[serde(alias = "bulk_its")]
    pub(crate) text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct BulkAddResponse {
    pub(crate) added_count: usize,
    pub(crate) skipped_count: usize,
    pub(crate) message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RemoveIdentifierResponse {
    pub(crate) removed: bool,
    pub(crate) identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RemovedCountResponse {
    pub(crate) removed_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ClearedCountResponse {
    pub(crate) cleared_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KickResponse {
    pub(crate) identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StreamUpdateResponse {
    pub(crate) ok: bool,
    pub(crate) settings: StreamSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GeoUpdateResponse {
    pub(crate) ok: bool,
    pub(crate) policy: GeoPolicy,
}

pub(crate) async fn admin_login(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<AdminLoginRequest>, JsonRejection>,
) -> Result<(CookieHeader, Json<AdminLoginResponse>), ApiError> {
    let Json(request) = payload?;
    let session = state
        .admin
        .authenticate(&request.username, &request.password)
        .await?;
    let policy = state.admin.sessions().policy();
    let cookie = session_cookie(
        ADMIN_COOKIE,
        session.token.as_str(),
        policy.absolute_ttl,
        state.http.cookie_secure,
    )?;
    let response = AdminLoginResponse {
        token: session.token.as_str().to_string(),
        expires_at: policy.expires_at(&session),
    };
    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

pub(crate) async fn admin_logout(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
) -> Result<(StatusCode, CookieHeader), ApiError> {
    state.admin.logout(&admin.token).await?;
    info!(username = %admin.username, "administrator signed out");
    let cookie = clear_cookie(ADMIN_COOKIE, state.http.cookie_secure)?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

pub(crate) async fn dashboard(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let snapshot = state.admin.dashboard().await?;
    state.refresh_session_gauges().await;
    Ok(Json(snapshot))
}

pub(crate) async fn add_identifier(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    payload: Result<Json<AddIdentifierRequest>, JsonRejection>,
) -> Result<Json<AddIdentifierResponse>, ApiError> {
    let Json(request) = payload?;
    let id = state.admin.add_identifier(&request.identifier).await?;
    state.telemetry.inc_admin_mutation("add_identifier");
    info!(username = %admin.username, identifier = %id, "identifier added");
    Ok(Json(AddIdentifierResponse {
        added: true,
        identifier: id.into(),
    }))
}

pub(crate) async fn add_identifiers_bulk(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    payload: Result<Json<BulkAddRequest>, JsonRejection>,
) -> Result<Json<BulkAddResponse>, ApiError> {
    let Json(request) = payload?;
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("No member IDs provided.")
            .with_invalid_param("text", "must not be empty"));
    }
    let report = state.admin.add_identifiers_bulk(&request.text).await?;
    state.telemetry.inc_admin_mutation("add_identifiers_bulk");
    info!(
        username = %admin.username,
        added = report.added,
        skipped = report.skipped,
        "bulk identifiers imported"
    );
    Ok(Json(BulkAddResponse {
        added_count: report.added,
        skipped_count: report.skipped,
        message: format!("Added {} member IDs.", report.added),
    }))
}

pub(crate) async fn remove_identifier(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    Path(identifier): Path<String>,
) -> Result<Json<RemoveIdentifierResponse>, ApiError> {
    let id = state.admin.remove_identifier(&identifier).await?;
    state.telemetry.inc_admin_mutation("remove_identifier");
    info!(username = %admin.username, identifier = %id, "identifier removed");
    Ok(Json(RemoveIdentifierResponse {
        removed: true,
        identifier: id.into(),
    }))
}

pub(crate) async fn remove_all_identifiers(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
) -> Result<Json<RemovedCountResponse>, ApiError> {
    let removed_count = state.admin.remove_all_identifiers().await?;
    state.telemetry.inc_admin_mutation("remove_all_identifiers");
    info!(username = %admin.username, removed_count, "registry cleared");
    Ok(Json(RemovedCountResponse { removed_count }))
}

pub(crate) async fn clear_sessions(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
) -> Result<Json<ClearedCountResponse>, ApiError> {
    let cleared_count = state.admin.clear_all_sessions().await?;
    state.telemetry.inc_admin_mutation("clear_sessions");
    info!(username = %admin.username, cleared_count, "member sessions cleared");
    Ok(Json(ClearedCountResponse { cleared_count }))
}

pub(crate) async fn kick_session(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    Path(token): Path<String>,
) -> Result<Json<KickResponse>, ApiError> {
    let identifier = state.admin.kick_session(&token).await?;
    state.telemetry.inc_admin_mutation("kick_session");
    info!(username = %admin.username, identifier = %identifier, "member session kicked");
    Ok(Json(KickResponse { identifier }))
}

pub(crate) async fn get_stream_settings(
    State(state): State<Arc<ApiState>>,
) -> Json<StreamSettings> {
    Json(state.admin.stream_settings().await)
}

pub(crate) async fn patch_stream_settings(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    payload: Result<Json<StreamSettingsPatch>, JsonRejection>,
) -> Result<Json<StreamUpdateResponse>, ApiError> {
    let Json(patch) = payload?;
    let settings = state.admin.update_stream_settings(patch).await?;
    state.telemetry.inc_admin_mutation("update_stream_settings");
    info!(username = %admin.username, no_stream = settings.no_stream, "stream settings updated");
    Ok(Json(StreamUpdateResponse { ok: true, settings }))
}

pub(crate) async fn get_geo_policy(State(state): State<Arc<ApiState>>) -> Json<GeoPolicy> {
    Json(state.admin.geo_policy().await)
}

pub(crate) async fn patch_geo_policy(
    State(state): State<Arc<ApiState>>,
    Extension(admin): Extension<AdminContext>,
    payload: Result<Json<GeoPolicyPatch>, JsonRejection>,
) -> Result<Json<GeoUpdateResponse>, ApiError> {
    let Json(patch) = payload?;
    let policy = state.admin.update_geo_policy(patch).await?;
    state.telemetry.inc_admin_mutation("update_geo_policy");
    info!(username = %admin.username, enabled = policy.enabled, "geo policy updated");
    Ok(Json(GeoUpdateResponse { ok: true, policy }))
}
