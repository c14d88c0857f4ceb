//! Persistence seams implemented by the in-memory, flat-file, and `PostgreSQL` backends.
//!
//! # Design
//! - Each method is atomic with respect to its own store; callers never compose a
//!   check and a write across two calls when a single conditional method exists.
//! - Expiry decisions are made inside the backend under the same lock/transaction
//!   as the mutation, using the policy and instant supplied by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::identifier::MemberId;
use crate::model::{AdminCredential, GeoPolicy, StreamSettings};
use crate::session::{ExpiryPolicy, Session};

/// Result of a conditional session insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The session was stored.
    Inserted,
    /// The owner already holds a live session under an exclusive policy.
    Conflict,
}

/// Storage for the approved identifier set.
#[async_trait]
pub trait IdentifierBackend: Send + Sync {
    /// Insert `id`; returns `false` if it was already present.
    async fn insert(&self, id: &MemberId) -> StorageResult<bool>;
    /// Insert every id not already present; returns how many were new.
    async fn insert_many(&self, ids: &[MemberId]) -> StorageResult<usize>;
    /// Remove `id`; returns `false` if it was absent.
    async fn remove(&self, id: &MemberId) -> StorageResult<bool>;
    /// Remove every id; returns how many were removed.
    async fn clear(&self) -> StorageResult<usize>;
    /// Membership check.
    async fn contains(&self, id: &MemberId) -> StorageResult<bool>;
    /// All ids in ascending order.
    async fn list(&self) -> StorageResult<Vec<MemberId>>;
    /// Number of ids.
    async fn count(&self) -> StorageResult<usize>;
}

/// Storage for one namespace of token-keyed sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Atomically drop the owner's expired sessions and insert `session` unless the
    /// policy is exclusive and a live session for the owner remains.
    async fn insert(
        &self,
        session: Session,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<InsertOutcome>;
    /// Look up `token`; when live, set `last_activity_at = now` and return the
    /// updated session. Expired sessions are removed and reported as `None`.
    async fn touch(
        &self,
        token: &str,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>>;
    /// Remove `token`, returning the removed session.
    async fn remove(&self, token: &str) -> StorageResult<Option<Session>>;
    /// Remove every session owned by `owner`.
    async fn remove_owner(&self, owner: &str) -> StorageResult<usize>;
    /// Remove every session.
    async fn clear(&self) -> StorageResult<usize>;
    /// Remove every expired session.
    async fn reap(&self, policy: &ExpiryPolicy, now: DateTime<Utc>) -> StorageResult<usize>;
    /// Every stored session, oldest first.
    async fn list(&self) -> StorageResult<Vec<Session>>;
}

/// Storage for the stream settings and geo policy singletons.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Stored stream settings, `None` when never written.
    async fn load_stream(&self) -> StorageResult<Option<StreamSettings>>;
    /// Replace the stream settings.
    async fn store_stream(&self, settings: &StreamSettings) -> StorageResult<()>;
    /// Stored geo policy, `None` when never written.
    async fn load_geo(&self) -> StorageResult<Option<GeoPolicy>>;
    /// Replace the geo policy.
    async fn store_geo(&self, policy: &GeoPolicy) -> StorageResult<()>;
}

/// Storage for the singleton administrator credential.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Stored credential, `None` when not yet provisioned.
    async fn load(&self) -> StorageResult<Option<AdminCredential>>;
    /// Store `credential` only if none exists; returns whether it was written.
    async fn store_if_absent(&self, credential: &AdminCredential) -> StorageResult<bool>;
}

/// Bundle of backend handles used to assemble the services.
#[derive(Clone)]
pub struct Backends {
    /// Approved identifier set.
    pub identifiers: Arc<dyn IdentifierBackend>,
    /// Member session namespace.
    pub member_sessions: Arc<dyn SessionBackend>,
    /// Administrator session namespace.
    pub admin_sessions: Arc<dyn SessionBackend>,
    /// Stream settings and geo policy.
    pub settings: Arc<dyn SettingsBackend>,
    /// Administrator credential.
    pub credentials: Arc<dyn CredentialBackend>,
}
