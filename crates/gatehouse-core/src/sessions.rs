//! Token-keyed session store for one namespace.

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{InsertOutcome, SessionBackend};
use crate::clock::SharedClock;
use crate::error::{GateError, GateResult};
use crate::session::{ExpiryPolicy, Session, SessionToken};

/// Session namespace label used in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Member sessions guarding the stream.
    Member,
    /// Administrator sessions guarding the mutation surface.
    Admin,
}

impl Namespace {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

/// Session operations bound to a backend, an expiry policy, and a clock.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    policy: ExpiryPolicy,
    clock: SharedClock,
    namespace: Namespace,
}

impl SessionStore {
    /// Assemble a store.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        policy: ExpiryPolicy,
        clock: SharedClock,
        namespace: Namespace,
    ) -> Self {
        Self {
            backend,
            policy,
            clock,
            namespace,
        }
    }

    /// Expiry policy applied by this store.
    #[must_use]
    pub const fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Namespace served by this store.
    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Issue a session for `owner` in one conditional write.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AlreadyActive`] when the policy is exclusive and the
    /// owner already holds a live session, or a storage error.
    pub async fn create_session(&self, owner: &str) -> GateResult<Session> {
        let now = self.clock.now();
        let session = Session::issue(owner, now);
        match self.backend.insert(session.clone(), &self.policy, now).await? {
            InsertOutcome::Inserted => {
                debug!(
                    namespace = self.namespace.as_str(),
                    token = %session.token.redacted(),
                    "session issued"
                );
                Ok(session)
            }
            InsertOutcome::Conflict => Err(GateError::AlreadyActive {
                identifier: owner.to_string(),
            }),
        }
    }

    /// Verify `raw_token` and refresh its activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthenticated`] for malformed, unknown, or expired
    /// tokens, or a storage error.
    pub async fn verify_and_touch(&self, raw_token: &str) -> GateResult<Session> {
        let token = SessionToken::parse(raw_token).map_err(|_| GateError::Unauthenticated)?;
        let now = self.clock.now();
        self.backend
            .touch(token.as_str(), &self.policy, now)
            .await?
            .ok_or(GateError::Unauthenticated)
    }

    /// Remove one session, returning it when it was still live.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::SessionNotFound`] when the token is malformed, absent,
    /// or already expired, or a storage error.
    pub async fn delete(&self, raw_token: &str) -> GateResult<Session> {
        let token = SessionToken::parse(raw_token).map_err(|_| GateError::SessionNotFound)?;
        let removed = self.backend.remove(token.as_str()).await?;
        match removed {
            Some(session) if !self.policy.is_expired(&session, self.clock.now()) => Ok(session),
            _ => Err(GateError::SessionNotFound),
        }
    }

    /// Remove every session owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn delete_all_for_identifier(&self, owner: &str) -> GateResult<usize> {
        let removed = self.backend.remove_owner(owner).await?;
        if removed > 0 {
            info!(namespace = self.namespace.as_str(), removed, "owner sessions removed");
        }
        Ok(removed)
    }

    /// Remove every session in the namespace.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn clear(&self) -> GateResult<usize> {
        self.sweep().await?;
        let removed = self.backend.clear().await?;
        info!(namespace = self.namespace.as_str(), removed, "sessions cleared");
        Ok(removed)
    }

    /// Reap expired sessions.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn sweep(&self) -> GateResult<usize> {
        let now = self.clock.now();
        Ok(self.backend.reap(&self.policy, now).await?)
    }

    /// Live sessions, oldest first, after reaping.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn list_live(&self) -> GateResult<Vec<Session>> {
        self.sweep().await?;
        let now = self.clock.now();
        let sessions = self.backend.list().await?;
        Ok(sessions
            .into_iter()
            .filter(|session| !self.policy.is_expired(session, now))
            .collect())
    }

    /// Number of live sessions after reaping.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn count(&self) -> GateResult<usize> {
        Ok(self.list_live().await?.len())
    }
}
