//! RFC9457-style API error wrapper.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use gatehouse_core::{ErrorKind, GateError};
use gatehouse_telemetry::{current_request_id, current_route};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::http::cookies::clear_cookie;
use crate::http::constants::{
    PROBLEM_BAD_REQUEST, PROBLEM_CONFLICT, PROBLEM_FORBIDDEN, PROBLEM_INTERNAL, PROBLEM_NOT_FOUND,
    PROBLEM_SERVICE_UNAVAILABLE, PROBLEM_UNAUTHORIZED,
};

/// RFC9457 problem document returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    /// Message suitable for showing to the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Fields that failed validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

/// Invalid field pointer attached to a [`ProblemDetails`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Why the value was rejected.
    pub message: String,
}

/// Structured API error with optional RFC9457 fields.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    invalid_params: Option<Vec<ProblemInvalidParam>>,
    cookie: Option<HeaderValue>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
            cookie: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_param(mut self, field: &str, message: impl Into<String>) -> Self {
        self.invalid_params
            .get_or_insert_with(Vec::new)
            .push(ProblemInvalidParam {
                pointer: format!("/{field}"),
                message: message.into(),
            });
        self
    }

    /// Attach a `Set-Cookie` header, typically one that clears a stale token.
    pub(crate) fn with_cookie(mut self, cookie: HeaderValue) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// Expire `cookie_name` on the client alongside this error.
    pub(crate) fn clearing(self, cookie_name: &str, secure: bool) -> Self {
        match clear_cookie(cookie_name, secure) {
            Ok(cookie) => self.with_cookie(cookie),
            Err(_) => self,
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(detail)
    }

    pub(crate) fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            PROBLEM_UNAUTHORIZED,
            "authentication required",
        )
        .with_detail(detail)
    }

    pub(crate) fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, PROBLEM_FORBIDDEN, "forbidden").with_detail(detail)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            PROBLEM_SERVICE_UNAVAILABLE,
            "service unavailable",
        )
        .with_detail(detail)
    }
}

/// Stable metric label for an error class.
pub(crate) const fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Authorization => "authorization",
        ErrorKind::Unauthenticated => "unauthenticated",
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not_found",
        ErrorKind::TransientStorage => "storage",
        ErrorKind::Internal => "internal",
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        let message = err.user_message();
        match &err {
            GateError::InvalidIdentifier { .. } => {
                Self::bad_request(message).with_invalid_param("identifier", "expected 8 digits")
            }
            GateError::InvalidField { field, reason } => {
                Self::bad_request(message).with_invalid_param(field, *reason)
            }
            GateError::NotWhitelisted { .. } | GateError::RegionBlocked { .. } => {
                Self::forbidden(message)
            }
            GateError::BadCredentials | GateError::Unauthenticated => Self::unauthorized(message),
            GateError::AlreadyActive { .. } | GateError::DuplicateIdentifier { .. } => {
                Self::conflict(message)
            }
            GateError::IdentifierNotFound { .. } | GateError::SessionNotFound => {
                Self::not_found(message)
            }
            GateError::Storage(source) => {
                error!(
                    error = %source.source,
                    operation = source.operation,
                    request_id = current_request_id().unwrap_or_default(),
                    route = current_route().unwrap_or_default(),
                    "storage failure while serving request"
                );
                Self::service_unavailable(message)
            }
            GateError::Credential { operation, detail } => {
                error!(
                    error = %detail,
                    operation = *operation,
                    request_id = current_request_id().unwrap_or_default(),
                    route = current_route().unwrap_or_default(),
                    "credential processing failed"
                );
                Self::internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(
            error = %rejection,
            route = current_route().unwrap_or_default(),
            "rejected request body"
        );
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(cookie) = self.cookie {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        response
    }
}
