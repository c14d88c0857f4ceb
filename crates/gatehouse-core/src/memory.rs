//! In-memory backends.
//!
//! `SessionTable` and `IdentifierSet` hold the synchronous state transitions so the
//! flat-file backend can reuse them under its own lock and persist afterwards.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{
    Backends, CredentialBackend, IdentifierBackend, InsertOutcome, SessionBackend,
    SettingsBackend,
};
use crate::error::StorageResult;
use crate::identifier::MemberId;
use crate::model::{AdminCredential, GeoPolicy, StreamSettings};
use crate::session::{ExpiryPolicy, Session};

/// Approved identifiers kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSet(BTreeSet<MemberId>);

impl IdentifierSet {
    /// Insert one id.
    pub fn insert(&mut self, id: &MemberId) -> bool {
        self.0.insert(id.clone())
    }

    /// Insert many ids, returning how many were new.
    pub fn insert_many(&mut self, ids: &[MemberId]) -> usize {
        ids.iter().filter(|id| self.0.insert((*id).clone())).count()
    }

    /// Remove one id.
    pub fn remove(&mut self, id: &MemberId) -> bool {
        self.0.remove(id)
    }

    /// Remove every id.
    pub fn clear(&mut self) -> usize {
        let count = self.0.len();
        self.0.clear();
        count
    }

    /// Membership check.
    #[must_use]
    pub fn contains(&self, id: &MemberId) -> bool {
        self.0.contains(id)
    }

    /// Sorted ids.
    #[must_use]
    pub fn to_vec(&self) -> Vec<MemberId> {
        self.0.iter().cloned().collect()
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Token-keyed session map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTable(HashMap<String, Session>);

impl SessionTable {
    /// Conditional insert honouring the policy's exclusivity.
    pub fn insert(
        &mut self,
        session: Session,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> InsertOutcome {
        let owner = session.owner.clone();
        self.0
            .retain(|_, existing| existing.owner != owner || !policy.is_expired(existing, now));
        if policy.exclusive && self.0.values().any(|existing| existing.owner == owner) {
            return InsertOutcome::Conflict;
        }
        self.0.insert(session.token.as_str().to_string(), session);
        InsertOutcome::Inserted
    }

    /// Verify and refresh one token.
    pub fn touch(
        &mut self,
        token: &str,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let expired = policy.is_expired(self.0.get(token)?, now);
        if expired {
            self.0.remove(token);
            return None;
        }
        let session = self.0.get_mut(token)?;
        session.last_activity_at = now;
        Some(session.clone())
    }

    /// Remove one token.
    pub fn remove(&mut self, token: &str) -> Option<Session> {
        self.0.remove(token)
    }

    /// Remove every session for `owner`.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|_, session| session.owner != owner);
        before - self.0.len()
    }

    /// Remove every session.
    pub fn clear(&mut self) -> usize {
        let count = self.0.len();
        self.0.clear();
        count
    }

    /// Remove every expired session.
    pub fn reap(&mut self, policy: &ExpiryPolicy, now: DateTime<Utc>) -> usize {
        let before = self.0.len();
        self.0.retain(|_, session| !policy.is_expired(session, now));
        before - self.0.len()
    }

    /// Sessions ordered by creation time.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.0.values().cloned().collect();
        sessions.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.owner.cmp(&right.owner))
        });
        sessions
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory identifier backend.
#[derive(Debug, Default)]
pub struct MemoryIdentifiers {
    inner: Mutex<IdentifierSet>,
}

#[async_trait]
impl IdentifierBackend for MemoryIdentifiers {
    async fn insert(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(lock(&self.inner).insert(id))
    }

    async fn insert_many(&self, ids: &[MemberId]) -> StorageResult<usize> {
        Ok(lock(&self.inner).insert_many(ids))
    }

    async fn remove(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(lock(&self.inner).remove(id))
    }

    async fn clear(&self) -> StorageResult<usize> {
        Ok(lock(&self.inner).clear())
    }

    async fn contains(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(lock(&self.inner).contains(id))
    }

    async fn list(&self) -> StorageResult<Vec<MemberId>> {
        Ok(lock(&self.inner).to_vec())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(lock(&self.inner).len())
    }
}

/// In-memory session backend for one namespace.
#[derive(Debug, Default)]
pub struct MemorySessions {
    inner: Mutex<SessionTable>,
}

#[async_trait]
impl SessionBackend for MemorySessions {
    async fn insert(
        &self,
        session: Session,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<InsertOutcome> {
        Ok(lock(&self.inner).insert(session, policy, now))
    }

    async fn touch(
        &self,
        token: &str,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        Ok(lock(&self.inner).touch(token, policy, now))
    }

    async fn remove(&self, token: &str) -> StorageResult<Option<Session>> {
        Ok(lock(&self.inner).remove(token))
    }

    async fn remove_owner(&self, owner: &str) -> StorageResult<usize> {
        Ok(lock(&self.inner).remove_owner(owner))
    }

    async fn clear(&self) -> StorageResult<usize> {
        Ok(lock(&self.inner).clear())
    }

    async fn reap(&self, policy: &ExpiryPolicy, now: DateTime<Utc>) -> StorageResult<usize> {
        Ok(lock(&self.inner).reap(policy, now))
    }

    async fn list(&self) -> StorageResult<Vec<Session>> {
        Ok(lock(&self.inner).list())
    }
}

/// In-memory settings backend.
#[derive(Debug, Default)]
pub struct MemorySettings {
    stream: Mutex<Option<StreamSettings>>,
    geo: Mutex<Option<GeoPolicy>>,
}

#[async_trait]
impl SettingsBackend for MemorySettings {
    async fn load_stream(&self) -> StorageResult<Option<StreamSettings>> {
        Ok(lock(&self.stream).clone())
    }

    async fn store_stream(&self, settings: &StreamSettings) -> StorageResult<()> {
        *lock(&self.stream) = Some(settings.clone());
        Ok(())
    }

    async fn load_geo(&self) -> StorageResult<Option<GeoPolicy>> {
        Ok(lock(&self.geo).clone())
    }

    async fn store_geo(&self, policy: &GeoPolicy) -> StorageResult<()> {
        *lock(&self.geo) = Some(policy.clone());
        Ok(())
    }
}

/// In-memory credential backend.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    inner: Mutex<Option<AdminCredential>>,
}

#[async_trait]
impl CredentialBackend for MemoryCredentials {
    async fn load(&self) -> StorageResult<Option<AdminCredential>> {
        Ok(lock(&self.inner).clone())
    }

    async fn store_if_absent(&self, credential: &AdminCredential) -> StorageResult<bool> {
        let mut guard = lock(&self.inner);
        if guard.is_some() {
            return Ok(false);
        }
        *guard = Some(credential.clone());
        Ok(true)
    }
}

/// Fresh, empty in-memory backends.
#[must_use]
pub fn memory_backends() -> Backends {
    Backends {
        identifiers: Arc::new(MemoryIdentifiers::default()),
        member_sessions: Arc::new(MemorySessions::default()),
        admin_sessions: Arc::new(MemorySessions::default()),
        settings: Arc::new(MemorySettings::default()),
        credentials: Arc::new(MemoryCredentials::default()),
    }
}
