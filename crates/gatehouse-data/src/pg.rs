//! `PostgreSQL` backend.
//!
//! # Design
//! - Exclusive session inserts run in one transaction holding a transaction-scoped
//!   advisory lock keyed by namespace and owner, so concurrent logins for the same
//!   identifier serialise even across application instances.
//! - Expiry cutoffs are computed from the caller's policy and instant and bound as
//!   parameters; the database clock is never consulted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::{
    AdminCredential, Backends, CredentialBackend, ExpiryPolicy, GeoPolicy, IdentifierBackend,
    InsertOutcome, MemberId, Namespace, Session, SessionBackend, SessionToken, SettingsBackend,
    StorageResult, StreamSettings,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::error::{DataError, Result};

const MAX_CONNECTIONS: u32 = 10;
const STREAM_SETTINGS_KEY: &str = "stream";
const GEO_POLICY_KEY: &str = "geo";

const LOCK_OWNER: &str = "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))";

const DELETE_EXPIRED_FOR_OWNER: &str = r"
    DELETE FROM sessions
    WHERE namespace = $1
      AND owner = $2
      AND (created_at < $3 OR ($4::timestamptz IS NOT NULL AND last_activity_at < $4))
";

const COUNT_FOR_OWNER: &str = r"
    SELECT COUNT(*) FROM sessions WHERE namespace = $1 AND owner = $2
";

const INSERT_SESSION: &str = r"
    INSERT INTO sessions (namespace, token, owner, created_at, last_activity_at)
    VALUES ($1, $2, $3, $4, $5)
";

const SELECT_SESSION_FOR_UPDATE: &str = r"
    SELECT token, owner, created_at, last_activity_at
    FROM sessions
    WHERE namespace = $1 AND token = $2
    FOR UPDATE
";

const TOUCH_SESSION: &str = r"
    UPDATE sessions SET last_activity_at = $3 WHERE namespace = $1 AND token = $2
";

const DELETE_SESSION: &str = r"
    DELETE FROM sessions
    WHERE namespace = $1 AND token = $2
    RETURNING token, owner, created_at, last_activity_at
";

const DELETE_OWNER_SESSIONS: &str = r"
    DELETE FROM sessions WHERE namespace = $1 AND owner = $2
";

const DELETE_NAMESPACE: &str = r"DELETE FROM sessions WHERE namespace = $1";

const DELETE_EXPIRED: &str = r"
    DELETE FROM sessions
    WHERE namespace = $1
      AND (created_at < $2 OR ($3::timestamptz IS NOT NULL AND last_activity_at < $3))
";

const LIST_SESSIONS: &str = r"
    SELECT token, owner, created_at, last_activity_at
    FROM sessions
    WHERE namespace = $1
    ORDER BY created_at, owner
";

const INSERT_IDENTIFIER: &str = r"
    INSERT INTO member_identifiers (identifier) VALUES ($1)
    ON CONFLICT (identifier) DO NOTHING
";

const INSERT_IDENTIFIERS: &str = r"
    INSERT INTO member_identifiers (identifier)
    SELECT UNNEST($1::text[])
    ON CONFLICT (identifier) DO NOTHING
";

const DELETE_IDENTIFIER: &str = r"DELETE FROM member_identifiers WHERE identifier = $1";

const DELETE_IDENTIFIERS: &str = r"DELETE FROM member_identifiers";

const IDENTIFIER_EXISTS: &str =
    r"SELECT EXISTS (SELECT 1 FROM member_identifiers WHERE identifier = $1)";

const LIST_IDENTIFIERS: &str = r"SELECT identifier FROM member_identifiers ORDER BY identifier";

const COUNT_IDENTIFIERS: &str = r"SELECT COUNT(*) FROM member_identifiers";

const SELECT_SETTING: &str = r"SELECT value FROM portal_settings WHERE key = $1";

const UPSERT_SETTING: &str = r"
    INSERT INTO portal_settings (key, value) VALUES ($1, $2)
    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
";

const SELECT_CREDENTIAL: &str = r"SELECT username, password_hash FROM admin_credentials WHERE id = 1";

const INSERT_CREDENTIAL_IF_ABSENT: &str = r"
    INSERT INTO admin_credentials (id, username, password_hash) VALUES (1, $1, $2)
    ON CONFLICT (id) DO NOTHING
";

/// Pooled `PostgreSQL` persistence.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connect to `url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "pool.connect",
                source,
            })?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        info!("postgres backend ready");
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Handles for assembling the services.
    #[must_use]
    pub fn backends(&self) -> Backends {
        Backends {
            identifiers: Arc::new(PgIdentifiers {
                pool: self.pool.clone(),
            }),
            member_sessions: Arc::new(PgSessions {
                pool: self.pool.clone(),
                namespace: Namespace::Member.as_str(),
            }),
            admin_sessions: Arc::new(PgSessions {
                pool: self.pool.clone(),
                namespace: Namespace::Admin.as_str(),
            }),
            settings: Arc::new(PgSettings {
                pool: self.pool.clone(),
            }),
            credentials: Arc::new(PgCredentials {
                pool: self.pool.clone(),
            }),
        }
    }
}

fn query_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

fn affected(rows: u64) -> usize {
    usize::try_from(rows).unwrap_or(usize::MAX)
}

fn cutoffs(
    policy: &ExpiryPolicy,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
    (
        now - policy.absolute_ttl,
        policy.idle_ttl.map(|idle| now - idle),
    )
}

#[derive(FromRow)]
struct SessionRow {
    token: String,
    owner: String,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self, operation: &'static str) -> Result<Session> {
        let token = SessionToken::parse(&self.token).map_err(|_| DataError::InvalidRecord {
            operation,
            field: "token",
        })?;
        Ok(Session {
            token,
            owner: self.owner,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}

struct PgIdentifiers {
    pool: PgPool,
}

#[async_trait]
impl IdentifierBackend for PgIdentifiers {
    async fn insert(&self, id: &MemberId) -> StorageResult<bool> {
        let result = sqlx::query(INSERT_IDENTIFIER)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("identifiers.insert"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_many(&self, ids: &[MemberId]) -> StorageResult<usize> {
        let values: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let result = sqlx::query(INSERT_IDENTIFIERS)
            .bind(values)
            .execute(&self.pool)
            .await
            .map_err(query_failed("identifiers.insert_many"))?;
        Ok(affected(result.rows_affected()))
    }

    async fn remove(&self, id: &MemberId) -> StorageResult<bool> {
        let result = sqlx::query(DELETE_IDENTIFIER)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("identifiers.remove"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear(&self) -> StorageResult<usize> {
        let result = sqlx::query(DELETE_IDENTIFIERS)
            .execute(&self.pool)
            .await
            .map_err(query_failed("identifiers.clear"))?;
        Ok(affected(result.rows_affected()))
    }

    async fn contains(&self, id: &MemberId) -> StorageResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(IDENTIFIER_EXISTS)
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("identifiers.contains"))?;
        Ok(exists)
    }

    async fn list(&self) -> StorageResult<Vec<MemberId>> {
        let rows = sqlx::query_scalar::<_, String>(LIST_IDENTIFIERS)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("identifiers.list"))?;
        let ids = rows
            .iter()
            .map(|raw| {
                MemberId::parse(raw).map_err(|_| DataError::InvalidRecord {
                    operation: "identifiers.list",
                    field: "identifier",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ids)
    }

    async fn count(&self) -> StorageResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(COUNT_IDENTIFIERS)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("identifiers.count"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

struct PgSessions {
    pool: PgPool,
    namespace: &'static str,
}

#[async_trait]
impl SessionBackend for PgSessions {
    async fn insert(
        &self,
        session: Session,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<InsertOutcome> {
        const OPERATION: &str = "sessions.insert";
        let (absolute_cutoff, idle_cutoff) = cutoffs(policy, now);
        let mut tx = self.pool.begin().await.map_err(query_failed(OPERATION))?;
        sqlx::query(LOCK_OWNER)
            .bind(format!("{}:{}", self.namespace, session.owner))
            .execute(&mut *tx)
            .await
            .map_err(query_failed(OPERATION))?;
        sqlx::query(DELETE_EXPIRED_FOR_OWNER)
            .bind(self.namespace)
            .bind(&session.owner)
            .bind(absolute_cutoff)
            .bind(idle_cutoff)
            .execute(&mut *tx)
            .await
            .map_err(query_failed(OPERATION))?;
        if policy.exclusive {
            let live = sqlx::query_scalar::<_, i64>(COUNT_FOR_OWNER)
                .bind(self.namespace)
                .bind(&session.owner)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_failed(OPERATION))?;
            if live > 0 {
                tx.commit().await.map_err(query_failed(OPERATION))?;
                return Ok(InsertOutcome::Conflict);
            }
        }
        sqlx::query(INSERT_SESSION)
            .bind(self.namespace)
            .bind(session.token.as_str())
            .bind(&session.owner)
            .bind(session.created_at)
            .bind(session.last_activity_at)
            .execute(&mut *tx)
            .await
            .map_err(query_failed(OPERATION))?;
        tx.commit().await.map_err(query_failed(OPERATION))?;
        Ok(InsertOutcome::Inserted)
    }

    async fn touch(
        &self,
        token: &str,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        const OPERATION: &str = "sessions.touch";
        let mut tx = self.pool.begin().await.map_err(query_failed(OPERATION))?;
        let row = sqlx::query_as::<_, SessionRow>(SELECT_SESSION_FOR_UPDATE)
            .bind(self.namespace)
            .bind(token)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed(OPERATION))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut session = row.into_session(OPERATION)?;
        if policy.is_expired(&session, now) {
            sqlx::query(DELETE_SESSION)
                .bind(self.namespace)
                .bind(token)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(OPERATION))?;
            tx.commit().await.map_err(query_failed(OPERATION))?;
            return Ok(None);
        }
        sqlx::query(TOUCH_SESSION)
            .bind(self.namespace)
            .bind(token)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(query_failed(OPERATION))?;
        tx.commit().await.map_err(query_failed(OPERATION))?;
        session.last_activity_at = now;
        Ok(Some(session))
    }

    async fn remove(&self, token: &str) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(DELETE_SESSION)
            .bind(self.namespace)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("sessions.remove"))?;
        Ok(row
            .map(|row| row.into_session("sessions.remove"))
            .transpose()?)
    }

    async fn remove_owner(&self, owner: &str) -> StorageResult<usize> {
        let result = sqlx::query(DELETE_OWNER_SESSIONS)
            .bind(self.namespace)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(query_failed("sessions.remove_owner"))?;
        Ok(affected(result.rows_affected()))
    }

    async fn clear(&self) -> StorageResult<usize> {
        let result = sqlx::query(DELETE_NAMESPACE)
            .bind(self.namespace)
            .execute(&self.pool)
            .await
            .map_err(query_failed("sessions.clear"))?;
        Ok(affected(result.rows_affected()))
    }

    async fn reap(&self, policy: &ExpiryPolicy, now: DateTime<Utc>) -> StorageResult<usize> {
        let (absolute_cutoff, idle_cutoff) = cutoffs(policy, now);
        let result = sqlx::query(DELETE_EXPIRED)
            .bind(self.namespace)
            .bind(absolute_cutoff)
            .bind(idle_cutoff)
            .execute(&self.pool)
            .await
            .map_err(query_failed("sessions.reap"))?;
        Ok(affected(result.rows_affected()))
    }

    async fn list(&self) -> StorageResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(LIST_SESSIONS)
            .bind(self.namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("sessions.list"))?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_session("sessions.list"))
            .collect::<Result<Vec<_>>>()?)
    }
}

struct PgSettings {
    pool: PgPool,
}

impl PgSettings {
    async fn load<T>(&self, key: &str, operation: &'static str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + Unpin + 'static,
    {
        let value = sqlx::query_scalar::<_, Json<T>>(SELECT_SETTING)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed(operation))?;
        Ok(value.map(|Json(inner)| inner))
    }

    async fn store<T>(&self, key: &str, value: &T, operation: &'static str) -> Result<()>
    where
        T: Serialize + Sync,
    {
        sqlx::query(UPSERT_SETTING)
            .bind(key)
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(query_failed(operation))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsBackend for PgSettings {
    async fn load_stream(&self) -> StorageResult<Option<StreamSettings>> {
        Ok(self
            .load(STREAM_SETTINGS_KEY, "settings.load_stream")
            .await?)
    }

    async fn store_stream(&self, settings: &StreamSettings) -> StorageResult<()> {
        Ok(self
            .store(STREAM_SETTINGS_KEY, settings, "settings.store_stream")
            .await?)
    }

    async fn load_geo(&self) -> StorageResult<Option<GeoPolicy>> {
        Ok(self.load(GEO_POLICY_KEY, "settings.load_geo").await?)
    }

    async fn store_geo(&self, policy: &GeoPolicy) -> StorageResult<()> {
        Ok(self
            .store(GEO_POLICY_KEY, policy, "settings.store_geo")
            .await?)
    }
}

struct PgCredentials {
    pool: PgPool,
}

#[async_trait]
impl CredentialBackend for PgCredentials {
    async fn load(&self) -> StorageResult<Option<AdminCredential>> {
        let row = sqlx::query_as::<_, (String, String)>(SELECT_CREDENTIAL)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("credentials.load"))?;
        Ok(row.map(|(username, password_hash)| AdminCredential {
            username,
            password_hash,
        }))
    }

    async fn store_if_absent(&self, credential: &AdminCredential) -> StorageResult<bool> {
        let result = sqlx::query(INSERT_CREDENTIAL_IF_ABSENT)
            .bind(&credential.username)
            .bind(&credential.password_hash)
            .execute(&self.pool)
            .await
            .map_err(query_failed("credentials.store_if_absent"))?;
        Ok(result.rows_affected() == 1)
    }
}
