//! JSON flat-file backend.
//!
//! # Design
//! - One document per store, held in memory behind an async mutex and written
//!   through on every change (temp file then rename).
//! - Each mutation is applied to a copy; memory is only updated once the write
//!   succeeds, so a failed write leaves both in the previous state.
//! - Session verification only refreshes `last_activity_at`. Those refreshes
//!   are written at most once per [`ACTIVITY_FLUSH_INTERVAL_SECS`] and
//!   otherwise ride along with the next write. After a restart a session can
//!   therefore look idle for up to that long more than it really was.
//! - Corrupt documents fail [`FileBackend::open`] instead of being reset.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gatehouse_core::{
    AdminCredential, Backends, CredentialBackend, ExpiryPolicy, GeoPolicy, IdentifierBackend,
    IdentifierSet, InsertOutcome, MemberId, Session, SessionBackend, SessionTable,
    SettingsBackend, StorageResult, StreamSettings,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DataError, Result};

const MEMBER_IDS_FILE: &str = "member_ids.json";
const MEMBER_SESSIONS_FILE: &str = "member_sessions.json";
const ADMIN_SESSIONS_FILE: &str = "admin_sessions.json";
const ADMIN_CREDENTIAL_FILE: &str = "admin_credential.json";
const STREAM_SETTINGS_FILE: &str = "stream_settings.json";
const GEO_POLICY_FILE: &str = "geo_policy.json";

/// Longest a refreshed activity timestamp stays memory-only.
pub const ACTIVITY_FLUSH_INTERVAL_SECS: i64 = 60;

struct JsonDocument<T> {
    path: PathBuf,
    state: Mutex<Slot<T>>,
}

struct Slot<T> {
    value: T,
    /// Set while memory holds refreshes the file does not.
    unflushed_since: Option<DateTime<Utc>>,
}

impl<T> JsonDocument<T>
where
    T: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send,
{
    async fn load(path: PathBuf) -> Result<Self> {
        let state = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => T::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| DataError::Decode {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => T::default(),
            Err(source) => {
                return Err(DataError::Io {
                    operation: "document.read",
                    path,
                    source,
                });
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(Slot {
                value: state,
                unflushed_since: None,
            }),
        })
    }

    async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let slot = self.state.lock().await;
        f(&slot.value)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slot = self.state.lock().await;
        let mut next = slot.value.clone();
        let outcome = f(&mut next);
        if next != slot.value {
            self.persist(&next).await?;
            slot.value = next;
            slot.unflushed_since = None;
        }
        Ok(outcome)
    }

    /// Apply a timestamp refresh, writing it through only when earlier
    /// refreshes have been pending for the flush interval.
    async fn refresh<R>(&self, now: DateTime<Utc>, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slot = self.state.lock().await;
        let mut next = slot.value.clone();
        let outcome = f(&mut next);
        if next == slot.value {
            return Ok(outcome);
        }
        let interval = ChronoDuration::seconds(ACTIVITY_FLUSH_INTERVAL_SECS);
        match slot.unflushed_since {
            Some(since) if now - since >= interval => {
                self.persist(&next).await?;
                slot.unflushed_since = None;
            }
            Some(_) => {}
            None => slot.unflushed_since = Some(now),
        }
        slot.value = next;
        Ok(outcome)
    }

    async fn persist(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| DataError::Encode {
            operation: "document.encode",
            source,
        })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &bytes)
            .await
            .map_err(|source| DataError::Io {
                operation: "document.write",
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|source| DataError::Io {
                operation: "document.rename",
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "document written");
        Ok(())
    }
}

/// Flat-file persistence rooted at one data directory.
pub struct FileBackend {
    identifiers: Arc<FileIdentifiers>,
    member_sessions: Arc<FileSessions>,
    admin_sessions: Arc<FileSessions>,
    settings: Arc<FileSettings>,
    credentials: Arc<FileCredentials>,
}

impl FileBackend {
    /// Load (or initialise) every document under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Io`] when the directory cannot be created or read and
    /// [`DataError::Decode`] when a document is corrupt.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .map_err(|source| DataError::Io {
                operation: "data_dir.create",
                path: dir.to_path_buf(),
                source,
            })?;
        let backend = Self {
            identifiers: Arc::new(FileIdentifiers(
                JsonDocument::load(dir.join(MEMBER_IDS_FILE)).await?,
            )),
            member_sessions: Arc::new(FileSessions(
                JsonDocument::load(dir.join(MEMBER_SESSIONS_FILE)).await?,
            )),
            admin_sessions: Arc::new(FileSessions(
                JsonDocument::load(dir.join(ADMIN_SESSIONS_FILE)).await?,
            )),
            settings: Arc::new(FileSettings {
                stream: JsonDocument::load(dir.join(STREAM_SETTINGS_FILE)).await?,
                geo: JsonDocument::load(dir.join(GEO_POLICY_FILE)).await?,
            }),
            credentials: Arc::new(FileCredentials(
                JsonDocument::load(dir.join(ADMIN_CREDENTIAL_FILE)).await?,
            )),
        };
        info!(dir = %dir.display(), "file backend opened");
        Ok(backend)
    }

    /// Handles for assembling the services.
    #[must_use]
    pub fn backends(&self) -> Backends {
        Backends {
            identifiers: self.identifiers.clone(),
            member_sessions: self.member_sessions.clone(),
            admin_sessions: self.admin_sessions.clone(),
            settings: self.settings.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

struct FileIdentifiers(JsonDocument<IdentifierSet>);

#[async_trait]
impl IdentifierBackend for FileIdentifiers {
    async fn insert(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(self.0.mutate(|set| set.insert(id)).await?)
    }

    async fn insert_many(&self, ids: &[MemberId]) -> StorageResult<usize> {
        Ok(self.0.mutate(|set| set.insert_many(ids)).await?)
    }

    async fn remove(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(self.0.mutate(|set| set.remove(id)).await?)
    }

    async fn clear(&self) -> StorageResult<usize> {
        Ok(self.0.mutate(IdentifierSet::clear).await?)
    }

    async fn contains(&self, id: &MemberId) -> StorageResult<bool> {
        Ok(self.0.read(|set| set.contains(id)).await)
    }

    async fn list(&self) -> StorageResult<Vec<MemberId>> {
        Ok(self.0.read(IdentifierSet::to_vec).await)
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.0.read(IdentifierSet::len).await)
    }
}

struct FileSessions(JsonDocument<SessionTable>);

#[async_trait]
impl SessionBackend for FileSessions {
    async fn insert(
        &self,
        session: Session,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<InsertOutcome> {
        Ok(self
            .0
            .mutate(|table| table.insert(session, policy, now))
            .await?)
    }

    async fn touch(
        &self,
        token: &str,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        Ok(self
            .0
            .refresh(now, |table| table.touch(token, policy, now))
            .await?)
    }

    async fn remove(&self, token: &str) -> StorageResult<Option<Session>> {
        Ok(self.0.mutate(|table| table.remove(token)).await?)
    }

    async fn remove_owner(&self, owner: &str) -> StorageResult<usize> {
        Ok(self.0.mutate(|table| table.remove_owner(owner)).await?)
    }

    async fn clear(&self) -> StorageResult<usize> {
        Ok(self.0.mutate(SessionTable::clear).await?)
    }

    async fn reap(&self, policy: &ExpiryPolicy, now: DateTime<Utc>) -> StorageResult<usize> {
        Ok(self.0.mutate(|table| table.reap(policy, now)).await?)
    }

    async fn list(&self) -> StorageResult<Vec<Session>> {
        Ok(self.0.read(SessionTable::list).await)
    }
}

struct FileSettings {
    stream: JsonDocument<Option<StreamSettings>>,
    geo: JsonDocument<Option<GeoPolicy>>,
}

#[async_trait]
impl SettingsBackend for FileSettings {
    async fn load_stream(&self) -> StorageResult<Option<StreamSettings>> {
        Ok(self.stream.read(Clone::clone).await)
    }

    async fn store_stream(&self, settings: &StreamSettings) -> StorageResult<()> {
        Ok(self
            .stream
            .mutate(|slot| *slot = Some(settings.clone()))
            .await?)
    }

    async fn load_geo(&self) -> StorageResult<Option<GeoPolicy>> {
        Ok(self.geo.read(Clone::clone).await)
    }

    async fn store_geo(&self, policy: &GeoPolicy) -> StorageResult<()> {
        Ok(self.geo.mutate(|slot| *slot = Some(policy.clone())).await?)
    }
}

struct FileCredentials(JsonDocument<Option<AdminCredential>>);

#[async_trait]
impl CredentialBackend for FileCredentials {
    async fn load(&self) -> StorageResult<Option<AdminCredential>> {
        Ok(self.0.read(Clone::clone).await)
    }

    async fn store_if_absent(&self, credential: &AdminCredential) -> StorageResult<bool> {
        Ok(self
            .0
            .mutate(|slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(credential.clone());
                true
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> MemberId {
        MemberId::parse(raw).unwrap_or_else(|err| panic!("fixture id {raw}: {err}"))
    }

    #[tokio::test]
    async fn documents_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let now = Utc::now();
        let policy = ExpiryPolicy::member_default();
        let token = {
            let backend = FileBackend::open(dir.path()).await?.backends();
            backend.identifiers.insert(&id("12345678")).await?;
            let session = Session::issue("12345678", now);
            let token = session.token.as_str().to_string();
            backend
                .member_sessions
                .insert(session, &policy, now)
                .await?;
            backend
                .settings
                .store_stream(&StreamSettings {
                    title: "Night session".into(),
                    ..StreamSettings::default()
                })
                .await?;
            token
        };

        let reopened = FileBackend::open(dir.path()).await?.backends();
        assert!(reopened.identifiers.contains(&id("12345678")).await?);
        let sessions = reopened.member_sessions.list().await?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token.as_str(), token);
        assert_eq!(sessions[0].owner, "12345678");
        let stream = reopened.settings.load_stream().await?;
        assert_eq!(stream.map(|s| s.title), Some("Night session".to_string()));
        assert!(reopened.admin_sessions.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_document_fails_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(MEMBER_IDS_FILE), b"{not json")?;
        let err = FileBackend::open(dir.path()).await.err();
        assert!(matches!(err, Some(DataError::Decode { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn exclusive_insert_is_enforced_on_disk_state() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::open(dir.path()).await?.backends();
        let policy = ExpiryPolicy::member_default();
        let now = Utc::now();
        let first = backend
            .member_sessions
            .insert(Session::issue("12345678", now), &policy, now)
            .await?;
        let second = backend
            .member_sessions
            .insert(Session::issue("12345678", now), &policy, now)
            .await?;
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Conflict);

        let later = now + ChronoDuration::hours(25);
        assert_eq!(backend.member_sessions.reap(&policy, later).await?, 1);
        let raw = std::fs::read_to_string(dir.path().join(MEMBER_SESSIONS_FILE))?;
        assert_eq!(raw.trim(), "{}");
        Ok(())
    }

    #[tokio::test]
    async fn credential_written_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::open(dir.path()).await?.backends();
        let credential = AdminCredential {
            username: "admin".into(),
            password_hash: "$argon2id$placeholder".into(),
        };
        assert!(backend.credentials.store_if_absent(&credential).await?);
        assert!(!backend.credentials.store_if_absent(&credential).await?);
        assert!(dir.path().join(ADMIN_CREDENTIAL_FILE).exists());
        Ok(())
    }

    async fn stored_activity(dir: &Path, token: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let sessions = FileBackend::open(dir)
            .await?
            .backends()
            .member_sessions
            .list()
            .await?;
        Ok(sessions
            .into_iter()
            .find(|session| session.token.as_str() == token)
            .map(|session| session.last_activity_at))
    }

    #[tokio::test]
    async fn activity_refreshes_are_batched_on_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::open(dir.path()).await?.backends();
        let policy = ExpiryPolicy::member_default();
        let start = Utc::now();
        let session = Session::issue("12345678", start);
        let token = session.token.as_str().to_string();
        backend
            .member_sessions
            .insert(session, &policy, start)
            .await?;

        let first = start + ChronoDuration::minutes(1);
        let refreshed = backend.member_sessions.touch(&token, &policy, first).await?;
        assert_eq!(refreshed.map(|s| s.last_activity_at), Some(first));
        assert_eq!(stored_activity(dir.path(), &token).await?, Some(start));

        let within = first + ChronoDuration::seconds(30);
        backend.member_sessions.touch(&token, &policy, within).await?;
        assert_eq!(stored_activity(dir.path(), &token).await?, Some(start));

        let due = first + ChronoDuration::seconds(ACTIVITY_FLUSH_INTERVAL_SECS);
        backend.member_sessions.touch(&token, &policy, due).await?;
        assert_eq!(stored_activity(dir.path(), &token).await?, Some(due));

        let pending = due + ChronoDuration::seconds(5);
        backend.member_sessions.touch(&token, &policy, pending).await?;
        backend
            .member_sessions
            .insert(Session::issue("87654321", pending), &policy, pending)
            .await?;
        assert_eq!(stored_activity(dir.path(), &token).await?, Some(pending));
        Ok(())
    }
}
