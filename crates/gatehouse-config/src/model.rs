//! Typed configuration records.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Fully validated process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalConfig {
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Selected persistence backend.
    pub storage: StorageConfig,
    /// Administrator bootstrap credential.
    pub admin: AdminBootstrap,
    /// Member session lifetimes.
    pub member_sessions: SessionTtls,
    /// Administrator session lifetimes.
    pub admin_sessions: SessionTtls,
    /// Background sweep period; `None` leaves reaping to verification.
    pub sweep_interval: Option<Duration>,
    /// HTTP surface knobs.
    pub http: HttpSettings,
    /// Logging knobs.
    pub logging: LogSettings,
}

/// Persistence backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local state, lost on restart.
    Memory,
    /// JSON documents under a directory.
    File {
        /// Directory holding the documents.
        data_dir: PathBuf,
    },
    /// `PostgreSQL` database.
    Postgres {
        /// Connection string.
        #[serde(skip_serializing)]
        database_url: String,
    },
}

impl StorageConfig {
    /// Stable lowercase label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File { .. } => "file",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Administrator credential used when none is stored yet.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AdminBootstrap {
    /// Username to provision.
    pub username: String,
    /// Password to provision; never serialised or logged.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Absolute and idle lifetimes for one session namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionTtls {
    /// Lifetime measured from issue.
    pub absolute: Duration,
    /// Maximum gap between verifications; `None` disables idle expiry.
    pub idle: Option<Duration>,
}

/// HTTP surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpSettings {
    /// Mark session cookies `Secure`.
    pub cookie_secure: bool,
    /// Request header carrying the caller's ISO country code.
    pub country_header: String,
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Explicit encoding; `None` lets the telemetry layer infer one.
    pub format: Option<LogOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_password_is_redacted() {
        let bootstrap = AdminBootstrap {
            username: "admin".into(),
            password: Some("hunter2".into()),
        };
        let debug = format!("{bootstrap:?}");
        assert!(!debug.contains("hunter2"));
        let json = serde_json::to_string(&bootstrap).unwrap_or_default();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn storage_labels_are_stable() {
        assert_eq!(StorageConfig::Memory.label(), "memory");
        assert_eq!(
            StorageConfig::Postgres {
                database_url: "postgres://x".into()
            }
            .label(),
            "postgres"
        );
    }
}
