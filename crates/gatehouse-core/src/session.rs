//! Session records, opaque tokens, and expiry rules.
//!
//! # Design
//! - Tokens carry 256 bits from the thread-local CSPRNG, encoded base64url without padding.
//! - Expiry is a pure function of the session timestamps and the policy; stores
//!   call it while holding their own lock so "expired implies unauthorized" holds
//!   at the moment of verification.

use std::fmt::{self, Display, Formatter};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

const TOKEN_BYTES: usize = 32;
const MAX_TOKEN_LEN: usize = 256;
const REDACTED_PREFIX_LEN: usize = 6;

/// Opaque, unguessable bearer token bound to one session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draw a fresh token from the CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Validate a token presented by a client.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidField`] when the input is empty, oversized, or
    /// contains characters outside the base64url alphabet.
    pub fn parse(raw: &str) -> GateResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::InvalidField {
                field: "token",
                reason: "must not be empty",
            });
        }
        if trimmed.len() > MAX_TOKEN_LEN
            || !trimmed
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
        {
            return Err(GateError::InvalidField {
                field: "token",
                reason: "must be a URL-safe token",
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the raw token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix that is safe to write to logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(REDACTED_PREFIX_LEN).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("SessionToken")
            .field(&self.redacted())
            .finish()
    }
}

impl Display for SessionToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Authenticated binding of an owner to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token handed to the client.
    pub token: SessionToken,
    /// Member identifier or admin username that owns the session.
    pub owner: String,
    /// When the session was issued.
    pub created_at: DateTime<Utc>,
    /// Last successful verification.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Open a new session for `owner` at `now` with a fresh token.
    #[must_use]
    pub fn issue(owner: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            token: SessionToken::generate(),
            owner: owner.into(),
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Expiry and exclusivity rules applied to one session namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Maximum lifetime measured from `created_at`.
    pub absolute_ttl: ChronoDuration,
    /// Maximum gap between verifications; `None` disables inactivity expiry.
    pub idle_ttl: Option<ChronoDuration>,
    /// Whether an owner may hold at most one live session.
    pub exclusive: bool,
}

impl ExpiryPolicy {
    /// Member defaults: 24h absolute, 30m idle, single session.
    #[must_use]
    pub fn member_default() -> Self {
        Self {
            absolute_ttl: ChronoDuration::hours(24),
            idle_ttl: Some(ChronoDuration::minutes(30)),
            exclusive: true,
        }
    }

    /// Admin defaults: 12h absolute, 30m idle, several devices allowed.
    #[must_use]
    pub fn admin_default() -> Self {
        Self {
            absolute_ttl: ChronoDuration::hours(12),
            idle_ttl: Some(ChronoDuration::minutes(30)),
            exclusive: false,
        }
    }

    /// Whether either TTL has elapsed for `session` at `now`.
    #[must_use]
    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        if now - session.created_at > self.absolute_ttl {
            return true;
        }
        self.idle_ttl
            .is_some_and(|idle| now - session.last_activity_at > idle)
    }

    /// Earliest instant at which the session stops authorizing access.
    #[must_use]
    pub fn expires_at(&self, session: &Session) -> DateTime<Utc> {
        let absolute = session.created_at + self.absolute_ttl;
        self.idle_ttl.map_or(absolute, |idle| {
            absolute.min(session.last_activity_at + idle)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::default() + ChronoDuration::minutes(minutes)
    }

    #[test]
    fn generated_tokens_are_url_safe_and_distinct() -> GateResult<()> {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = SessionToken::generate();
            assert_eq!(token.as_str().len(), 43);
            SessionToken::parse(token.as_str())?;
            assert!(seen.insert(token));
        }
        Ok(())
    }

    #[test]
    fn parse_rejects_blank_and_foreign_characters() {
        assert!(SessionToken::parse("  ").is_err());
        assert!(SessionToken::parse("abc/def").is_err());
        assert!(SessionToken::parse("abc=").is_err());
        assert!(SessionToken::parse(&"a".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = SessionToken::generate();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains(token.as_str()));
    }

    #[test]
    fn absolute_ttl_fires_even_with_recent_activity() {
        let policy = ExpiryPolicy::member_default();
        let mut session = Session::issue("12345678", at(0));
        session.last_activity_at = at(25 * 60 - 1);
        assert!(policy.is_expired(&session, at(25 * 60)));
    }

    #[test]
    fn idle_ttl_fires_first_when_inactive() {
        let policy = ExpiryPolicy::member_default();
        let session = Session::issue("12345678", at(0));
        assert!(!policy.is_expired(&session, at(30)));
        assert!(policy.is_expired(&session, at(31)));
        assert_eq!(policy.expires_at(&session), at(30));
    }

    #[test]
    fn disabled_idle_ttl_only_uses_absolute() {
        let policy = ExpiryPolicy {
            idle_ttl: None,
            ..ExpiryPolicy::member_default()
        };
        let session = Session::issue("12345678", at(0));
        assert!(!policy.is_expired(&session, at(23 * 60)));
        assert_eq!(policy.expires_at(&session), at(24 * 60));
    }
}
