//! Error types for the durable backends.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

use gatehouse_core::StorageError;

/// Result alias for backend operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the file and `PostgreSQL` backends.
#[derive(Debug)]
pub enum DataError {
    /// Filesystem access failed.
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path being accessed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A stored document could not be parsed.
    Decode {
        /// Document path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A value could not be serialised.
    Encode {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A stored row violated a domain invariant.
    InvalidRecord {
        /// Operation identifier.
        operation: &'static str,
        /// Column or field that failed validation.
        field: &'static str,
    },
}

impl DataError {
    /// Operation identifier carried by the error.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Io { operation, .. }
            | Self::Encode { operation, .. }
            | Self::QueryFailed { operation, .. }
            | Self::InvalidRecord { operation, .. } => operation,
            Self::Decode { .. } => "document.decode",
            Self::MigrationFailed { .. } => "migrate",
        }
    }
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { .. } => formatter.write_str("filesystem operation failed"),
            Self::Decode { .. } => formatter.write_str("stored document is corrupt"),
            Self::Encode { .. } => formatter.write_str("failed to encode document"),
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::InvalidRecord { .. } => formatter.write_str("stored record is invalid"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode { source, .. } | Self::Encode { source, .. } => Some(source),
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::InvalidRecord { .. } => None,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(source: sqlx::Error) -> Self {
        Self::QueryFailed {
            operation: "sqlx operation",
            source,
        }
    }
}

impl From<DataError> for StorageError {
    fn from(err: DataError) -> Self {
        Self::new(err.operation(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_constant_and_source_is_kept() {
        let io = DataError::Io {
            operation: "document.write",
            path: PathBuf::from("data/member_ids.json"),
            source: io::Error::other("disk full"),
        };
        assert_eq!(io.to_string(), "filesystem operation failed");
        assert!(io.source().is_some());

        let query = DataError::QueryFailed {
            operation: "sessions.insert",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(query.to_string(), "database operation failed");
        assert_eq!(query.operation(), "sessions.insert");

        let record = DataError::InvalidRecord {
            operation: "identifiers.list",
            field: "identifier",
        };
        assert!(record.source().is_none());
    }

    #[test]
    fn converts_into_storage_error_with_operation() {
        let err = StorageError::from(DataError::from(sqlx::Error::PoolClosed));
        assert_eq!(err.operation, "sqlx operation");
        assert!(err.source().is_some());
    }
}
