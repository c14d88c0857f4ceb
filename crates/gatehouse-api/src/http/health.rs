//! Liveness and metrics endpoints.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use chrono::{DateTime, Utc};
use gatehouse_telemetry::build_sha;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) version: String,
    pub(crate) build: String,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: build_sha().to_string(),
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    state.refresh_session_gauges().await;
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
