//! HTTP surface modules (router, handlers, middleware).

/// Administrator handlers.
pub mod admin;
/// Token extraction and the administrator guard.
pub mod auth;
/// Shared constants and header names.
pub mod constants;
/// Session cookie helpers.
pub mod cookies;
/// Problem response helpers and error types.
pub mod errors;
/// Liveness and metrics endpoints.
pub mod health;
/// Member handlers.
pub mod member;
/// Router construction and server host.
pub mod router;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
