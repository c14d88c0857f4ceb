//! # Design
//!
//! - One error type for the boot sequence, tagged with the failing operation.
//! - Messages stay constant; context lives in fields.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: gatehouse_config::ConfigError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: gatehouse_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: gatehouse_telemetry::TelemetryError,
    },
    /// Opening a storage backend failed.
    #[error("storage backend operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: gatehouse_data::DataError,
    },
    /// A portal service call failed during bootstrap.
    #[error("portal operation failed")]
    Portal {
        /// Operation identifier.
        operation: &'static str,
        /// Source domain error.
        source: gatehouse_core::GateError,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: gatehouse_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: gatehouse_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: gatehouse_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: gatehouse_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn portal(operation: &'static str, source: gatehouse_core::GateError) -> Self {
        Self::Portal { operation, source }
    }
}
