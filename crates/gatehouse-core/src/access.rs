//! Member sign-in, access checks, and sign-out.
//!
//! # Design
//! - Login checks, in order: identifier format, region, registry membership, then
//!   the conditional session insert.
//! - A removal racing a login is closed by re-checking membership after the insert
//!   and rolling the new session back. A rollback that cannot be completed is
//!   reported as a storage error, never as a plain refusal.
//! - Verification also requires the owner to still be registered, so a session
//!   left behind by a failed cascade never grants access.

use tracing::{error, info, instrument, warn};

use crate::error::{GateError, GateResult};
use crate::identifier::MemberId;
use crate::model::StreamSettings;
use crate::registry::IdentifierRegistry;
use crate::session::Session;
use crate::sessions::SessionStore;
use crate::settings::SettingsStore;

/// Member-facing access orchestration.
#[derive(Clone)]
pub struct AccessController {
    registry: IdentifierRegistry,
    sessions: SessionStore,
    settings: SettingsStore,
}

impl AccessController {
    /// Assemble the controller.
    #[must_use]
    pub fn new(
        registry: IdentifierRegistry,
        sessions: SessionStore,
        settings: SettingsStore,
    ) -> Self {
        Self {
            registry,
            sessions,
            settings,
        }
    }

    /// Member session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Refuse callers outside the configured region.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RegionBlocked`] when the geo policy is enabled and
    /// `country` is unknown or not allowed.
    pub async fn admit_region(&self, country: Option<&str>) -> GateResult<()> {
        let policy = self.settings.geo_policy().await;
        if policy.permits(country) {
            Ok(())
        } else {
            Err(GateError::RegionBlocked {
                country: country.map(str::to_string),
                message: policy.blocked_message,
            })
        }
    }

    /// Sign a member in from a caller in `country`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidIdentifier`], [`GateError::RegionBlocked`],
    /// [`GateError::NotWhitelisted`], [`GateError::AlreadyActive`], or a storage error.
    #[instrument(name = "access.login", skip(self, raw_identifier))]
    pub async fn login(&self, raw_identifier: &str, country: Option<&str>) -> GateResult<Session> {
        let id = MemberId::parse(raw_identifier)?;
        self.admit_region(country).await?;
        if !self.registry.contains(&id).await? {
            warn!(identifier = %id, "login refused: not whitelisted");
            return Err(GateError::NotWhitelisted {
                identifier: id.to_string(),
            });
        }
        let session = self.sessions.create_session(id.as_str()).await?;
        match self.registry.contains(&id).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&id, &session).await?;
                warn!(identifier = %id, "login rolled back: identifier removed concurrently");
                return Err(GateError::NotWhitelisted {
                    identifier: id.to_string(),
                });
            }
            Err(err) => {
                self.discard(&id, &session).await?;
                return Err(err);
            }
        }
        info!(identifier = %id, token = %session.token.redacted(), "member signed in");
        Ok(session)
    }

    /// Remove a session issued to `id` that must not outlive the call. Tries the
    /// token first, then every session the owner holds.
    async fn discard(&self, id: &MemberId, session: &Session) -> GateResult<()> {
        match self.sessions.delete(session.token.as_str()).await {
            Ok(_) | Err(GateError::SessionNotFound) => return Ok(()),
            Err(err) => {
                warn!(identifier = %id, error = %err, "session rollback by token failed");
            }
        }
        match self.sessions.delete_all_for_identifier(id.as_str()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(
                    identifier = %id,
                    token = %session.token.redacted(),
                    "session rollback failed; session is unusable but still stored"
                );
                Err(err)
            }
        }
    }

    /// Verify a member token, refreshing its activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthenticated`] when the token is not live or its
    /// owner is no longer registered, or a storage error.
    pub async fn check_access(&self, raw_token: &str) -> GateResult<Session> {
        let session = self.sessions.verify_and_touch(raw_token).await?;
        let owner = MemberId::parse(&session.owner).map_err(|_| GateError::Unauthenticated)?;
        if !self.registry.contains(&owner).await? {
            self.discard(&owner, &session).await?;
            warn!(identifier = %owner, "session dropped: owner no longer registered");
            return Err(GateError::Unauthenticated);
        }
        Ok(session)
    }

    /// Stream settings shown to members with a live session.
    pub async fn stream_settings(&self) -> StreamSettings {
        self.settings.stream_settings().await
    }

    /// End one session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn logout(&self, raw_token: &str) -> GateResult<()> {
        match self.sessions.delete(raw_token).await {
            Ok(session) => {
                info!(identifier = %session.owner, "member signed out");
                Ok(())
            }
            Err(GateError::SessionNotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// End every session owned by the identifier behind `raw_token`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthenticated`] when the token is not live, or a
    /// storage error.
    pub async fn logout_all(&self, raw_token: &str) -> GateResult<usize> {
        let session = self.check_access(raw_token).await?;
        let removed = self
            .sessions
            .delete_all_for_identifier(&session.owner)
            .await?;
        info!(identifier = %session.owner, removed, "member signed out everywhere");
        Ok(removed)
    }
}
