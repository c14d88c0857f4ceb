//! Error types for access-control operations.
//!
//! # Design
//! - Every variant carries a constant display message; context lives in fields.
//! - `kind()` folds variants into the coarse classes surfaced to clients.
//! - Backend failures are boxed into `StorageError` so the domain stays storage-agnostic.

use std::error::Error as StdError;

use thiserror::Error;

/// Convenience alias for access-control results.
pub type GateResult<T> = Result<T, GateError>;

/// Convenience alias for backend results.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure raised by a persistence backend.
#[derive(Debug, Error)]
#[error("storage operation failed")]
pub struct StorageError {
    /// Operation identifier (for example `sessions.insert`).
    pub operation: &'static str,
    /// Underlying backend error.
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StorageError {
    /// Wrap a backend error with the operation that produced it.
    pub fn new(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Coarse classification of [`GateError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed identifier, token, or field.
    Validation,
    /// Caller is not permitted (not whitelisted, bad credentials, blocked region).
    Authorization,
    /// Caller presented no live session.
    Unauthenticated,
    /// State conflict (live session exists, duplicate identifier).
    Conflict,
    /// Target identifier or session is absent.
    NotFound,
    /// Backing store is unavailable.
    TransientStorage,
    /// Fault inside the service itself; retrying will not help.
    Internal,
}

/// Primary error type for access-control operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// Identifier did not match the eight-digit format.
    #[error("invalid member identifier")]
    InvalidIdentifier {
        /// Offending input.
        value: String,
    },
    /// A request field failed validation.
    #[error("invalid field")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Identifier is well-formed but not on the approved list.
    #[error("member identifier not authorized")]
    NotWhitelisted {
        /// Identifier that was rejected.
        identifier: String,
    },
    /// Geo policy refused the caller's region.
    #[error("region not permitted")]
    RegionBlocked {
        /// Country reported by the geolocation collaborator, if any.
        country: Option<String>,
        /// Message configured on the geo policy.
        message: String,
    },
    /// Administrator username or password did not match.
    #[error("invalid administrator credentials")]
    BadCredentials,
    /// Token was missing, unknown, expired, or revoked.
    #[error("no live session")]
    Unauthenticated,
    /// Identifier already owns a live session.
    #[error("member already has a live session")]
    AlreadyActive {
        /// Identifier holding the live session.
        identifier: String,
    },
    /// Identifier is already on the approved list.
    #[error("member identifier already registered")]
    DuplicateIdentifier {
        /// Identifier that was duplicated.
        identifier: String,
    },
    /// Identifier is not on the approved list.
    #[error("member identifier not found")]
    IdentifierNotFound {
        /// Identifier that was requested.
        identifier: String,
    },
    /// Session token is not live.
    #[error("session not found")]
    SessionNotFound,
    /// Stored credential could not be hashed or parsed.
    #[error("credential processing failed")]
    Credential {
        /// Step that failed (for example `password.verify`).
        operation: &'static str,
        /// Message from the hashing library.
        detail: String,
    },
    /// Backing store failed.
    #[error("storage unavailable")]
    Storage(#[from] StorageError),
}

impl GateError {
    /// Classify the error into its client-facing category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier { .. } | Self::InvalidField { .. } => ErrorKind::Validation,
            Self::NotWhitelisted { .. } | Self::RegionBlocked { .. } | Self::BadCredentials => {
                ErrorKind::Authorization
            }
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::AlreadyActive { .. } | Self::DuplicateIdentifier { .. } => ErrorKind::Conflict,
            Self::IdentifierNotFound { .. } | Self::SessionNotFound => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::TransientStorage,
            Self::Credential { .. } => ErrorKind::Internal,
        }
    }

    /// Stable message suitable for showing to the person at the keyboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidIdentifier { .. } => "Please enter a valid 8-digit member ID.".to_string(),
            Self::InvalidField { field, reason } => format!("Invalid {field}: {reason}."),
            Self::NotWhitelisted { .. } => {
                "Member ID not authorized. Please contact the administrator.".to_string()
            }
            Self::RegionBlocked { message, .. } => message.clone(),
            Self::BadCredentials => "Invalid username or password.".to_string(),
            Self::Unauthenticated => "Your session has ended. Please sign in again.".to_string(),
            Self::AlreadyActive { .. } => {
                "This member ID is already signed in on another device.".to_string()
            }
            Self::DuplicateIdentifier { .. } => "Member ID already exists.".to_string(),
            Self::IdentifierNotFound { .. } => "Member ID not found.".to_string(),
            Self::SessionNotFound => "Session not found.".to_string(),
            Self::Storage(_) => {
                "The service is temporarily unavailable. Please try again.".to_string()
            }
            Self::Credential { .. } => "The request could not be completed.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn kinds_cover_each_class() {
        assert_eq!(
            GateError::InvalidIdentifier {
                value: "x".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(GateError::BadCredentials.kind(), ErrorKind::Authorization);
        assert_eq!(
            GateError::AlreadyActive {
                identifier: "12345678".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(GateError::SessionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(GateError::Unauthenticated.kind(), ErrorKind::Unauthenticated);
        let storage = GateError::from(StorageError::new(
            "sessions.insert",
            io::Error::other("disk gone"),
        ));
        assert_eq!(storage.kind(), ErrorKind::TransientStorage);
        let credential = GateError::Credential {
            operation: "password.parse",
            detail: "invalid PHC string".into(),
        };
        assert_eq!(credential.kind(), ErrorKind::Internal);
    }

    #[test]
    fn storage_error_preserves_source() {
        let err = StorageError::new("identifiers.insert", io::Error::other("boom"));
        assert_eq!(err.to_string(), "storage operation failed");
        assert!(err.source().is_some());
        assert_eq!(err.operation, "identifiers.insert");
    }

    #[test]
    fn region_message_is_passed_through() {
        let err = GateError::RegionBlocked {
            country: Some("FR".into()),
            message: "Streaming is limited to India.".into(),
        };
        assert_eq!(err.user_message(), "Streaming is limited to India.");
    }
}
