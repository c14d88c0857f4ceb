//! Administrator authentication and the mutation surface.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::CredentialBackend;
use crate::error::{GateError, GateResult};
use crate::identifier::MemberId;
use crate::model::{
    AdminCredential, BulkAddReport, DashboardSnapshot, GeoPolicy, GeoPolicyPatch, SessionView,
    StreamSettings, StreamSettingsPatch,
};
use crate::password::{hash_secret, verify_secret};
use crate::registry::IdentifierRegistry;
use crate::session::Session;
use crate::sessions::SessionStore;
use crate::settings::SettingsStore;

/// Administrative entry point over the registry, sessions, and settings.
#[derive(Clone)]
pub struct AdminGateway {
    credentials: Arc<dyn CredentialBackend>,
    admin_sessions: SessionStore,
    member_sessions: SessionStore,
    registry: IdentifierRegistry,
    settings: SettingsStore,
}

impl AdminGateway {
    /// Assemble the gateway.
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialBackend>,
        admin_sessions: SessionStore,
        member_sessions: SessionStore,
        registry: IdentifierRegistry,
        settings: SettingsStore,
    ) -> Self {
        Self {
            credentials,
            admin_sessions,
            member_sessions,
            registry,
            settings,
        }
    }

    /// Administrator session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.admin_sessions
    }

    /// Provision the administrator credential unless one is already stored.
    ///
    /// Returns whether a credential was written.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidField`] for a blank username or password, or a
    /// storage error.
    pub async fn ensure_credential(&self, username: &str, password: &str) -> GateResult<bool> {
        let username = username.trim();
        if username.is_empty() {
            return Err(GateError::InvalidField {
                field: "username",
                reason: "must not be empty",
            });
        }
        if password.is_empty() {
            return Err(GateError::InvalidField {
                field: "password",
                reason: "must not be empty",
            });
        }
        let credential = AdminCredential {
            username: username.to_string(),
            password_hash: hash_secret(password)?,
        };
        let written = self.credentials.store_if_absent(&credential).await?;
        if written {
            info!(username, "administrator credential provisioned");
        }
        Ok(written)
    }

    /// Whether a credential has been provisioned.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn has_credential(&self) -> GateResult<bool> {
        Ok(self.credentials.load().await?.is_some())
    }

    /// Check credentials and open an administrator session.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BadCredentials`] on mismatch or when no credential is
    /// provisioned, or a storage error.
    #[instrument(name = "admin.authenticate", skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> GateResult<Session> {
        let Some(stored) = self.credentials.load().await? else {
            warn!("administrator login attempted before provisioning");
            return Err(GateError::BadCredentials);
        };
        let password_ok = verify_secret(&stored.password_hash, password)?;
        if !password_ok || stored.username != username.trim() {
            warn!("administrator login refused");
            return Err(GateError::BadCredentials);
        }
        let session = self.admin_sessions.create_session(&stored.username).await?;
        info!(token = %session.token.redacted(), "administrator signed in");
        Ok(session)
    }

    /// Verify an administrator token.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthenticated`] when the token is not live, or a
    /// storage error.
    pub async fn authorize(&self, raw_token: &str) -> GateResult<Session> {
        self.admin_sessions.verify_and_touch(raw_token).await
    }

    /// End an administrator session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn logout(&self, raw_token: &str) -> GateResult<()> {
        match self.admin_sessions.delete(raw_token).await {
            Ok(_) | Err(GateError::SessionNotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Add one identifier.
    ///
    /// # Errors
    ///
    /// See [`IdentifierRegistry::add`].
    pub async fn add_identifier(&self, raw: &str) -> GateResult<MemberId> {
        self.registry.add(raw).await
    }

    /// Add identifiers from newline/comma separated text.
    ///
    /// # Errors
    ///
    /// See [`IdentifierRegistry::add_bulk`].
    pub async fn add_identifiers_bulk(&self, text: &str) -> GateResult<BulkAddReport> {
        self.registry.add_bulk(text).await
    }

    /// Remove one identifier and its sessions.
    ///
    /// # Errors
    ///
    /// See [`IdentifierRegistry::remove`].
    pub async fn remove_identifier(&self, raw: &str) -> GateResult<MemberId> {
        self.registry.remove(raw).await
    }

    /// Remove every identifier and member session.
    ///
    /// # Errors
    ///
    /// See [`IdentifierRegistry::remove_all`].
    pub async fn remove_all_identifiers(&self) -> GateResult<usize> {
        self.registry.remove_all().await
    }

    /// Sign every member out.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn clear_all_sessions(&self) -> GateResult<usize> {
        self.member_sessions.clear().await
    }

    /// Remove the member session behind `raw_token`, returning its owner.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::SessionNotFound`] when no live session matches, or a
    /// storage error.
    #[instrument(name = "admin.kick", skip(self, raw_token))]
    pub async fn kick_session(&self, raw_token: &str) -> GateResult<String> {
        let session = self.member_sessions.delete(raw_token).await?;
        info!(identifier = %session.owner, "member session kicked");
        Ok(session.owner)
    }

    /// Current stream settings.
    pub async fn stream_settings(&self) -> StreamSettings {
        self.settings.stream_settings().await
    }

    /// Current geo policy.
    pub async fn geo_policy(&self) -> GeoPolicy {
        self.settings.geo_policy().await
    }

    /// Update the stream settings.
    ///
    /// # Errors
    ///
    /// See [`SettingsStore::update_stream_settings`].
    pub async fn update_stream_settings(
        &self,
        patch: StreamSettingsPatch,
    ) -> GateResult<StreamSettings> {
        self.settings.update_stream_settings(patch).await
    }

    /// Update the geo policy.
    ///
    /// # Errors
    ///
    /// See [`SettingsStore::update_geo_policy`].
    pub async fn update_geo_policy(&self, patch: GeoPolicyPatch) -> GateResult<GeoPolicy> {
        self.settings.update_geo_policy(patch).await
    }

    /// Point-in-time view for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the registry or sessions cannot be read.
    pub async fn dashboard(&self) -> GateResult<DashboardSnapshot> {
        let identifiers = self.registry.list().await?;
        let sessions = self.member_sessions.list_live().await?;
        let stream = self.settings.stream_settings().await;
        let geo = self.settings.geo_policy().await;
        Ok(DashboardSnapshot {
            identifier_count: identifiers.len(),
            live_session_count: sessions.len(),
            identifiers: identifiers.into_iter().map(String::from).collect(),
            sessions: sessions
                .into_iter()
                .map(|session| SessionView {
                    identifier: session.owner,
                    token: session.token.as_str().to_string(),
                    created_at: session.created_at,
                    last_activity_at: session.last_activity_at,
                })
                .collect(),
            stream,
            geo,
        })
    }
}
