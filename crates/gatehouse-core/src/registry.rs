//! Approved member identifier registry with session cascades.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::backend::IdentifierBackend;
use crate::error::{GateError, GateResult};
use crate::identifier::{MemberId, split_bulk};
use crate::model::BulkAddReport;
use crate::sessions::SessionStore;

/// Whitelist of identifiers permitted to sign in.
#[derive(Clone)]
pub struct IdentifierRegistry {
    backend: Arc<dyn IdentifierBackend>,
    sessions: SessionStore,
}

impl IdentifierRegistry {
    /// Wrap `backend`; removals cascade into `sessions`.
    #[must_use]
    pub fn new(backend: Arc<dyn IdentifierBackend>, sessions: SessionStore) -> Self {
        Self { backend, sessions }
    }

    /// Add one identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidIdentifier`] for malformed input,
    /// [`GateError::DuplicateIdentifier`] when already present, or a storage error.
    #[instrument(name = "registry.add", skip(self))]
    pub async fn add(&self, raw: &str) -> GateResult<MemberId> {
        let id = MemberId::parse(raw)?;
        if !self.backend.insert(&id).await? {
            return Err(GateError::DuplicateIdentifier {
                identifier: id.to_string(),
            });
        }
        info!(identifier = %id, "identifier added");
        Ok(id)
    }

    /// Add every well-formed identifier in `text`, skipping malformed tokens and
    /// ids already present.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    #[instrument(name = "registry.add_bulk", skip(self, text))]
    pub async fn add_bulk(&self, text: &str) -> GateResult<BulkAddReport> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut total = 0_usize;
        for token in split_bulk(text) {
            total += 1;
            if let Ok(id) = MemberId::parse(token)
                && seen.insert(id.clone())
            {
                candidates.push(id);
            }
        }
        let added = if candidates.is_empty() {
            0
        } else {
            self.backend.insert_many(&candidates).await?
        };
        let report = BulkAddReport {
            added,
            skipped: total - added,
        };
        info!(added = report.added, skipped = report.skipped, "bulk import finished");
        Ok(report)
    }

    /// Remove one identifier and every session it owns.
    ///
    /// The identifier goes first: a login racing this call re-checks membership
    /// after its insert, and verification refuses sessions whose owner is gone.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidIdentifier`] for malformed input,
    /// [`GateError::IdentifierNotFound`] when absent, or a storage error. A
    /// storage error from the cascade means the identifier is gone but its
    /// sessions are still stored.
    #[instrument(name = "registry.remove", skip(self))]
    pub async fn remove(&self, raw: &str) -> GateResult<MemberId> {
        let id = MemberId::parse(raw)?;
        if !self.backend.remove(&id).await? {
            return Err(GateError::IdentifierNotFound {
                identifier: id.to_string(),
            });
        }
        if let Err(err) = self.sessions.delete_all_for_identifier(id.as_str()).await {
            error!(identifier = %id, "identifier removed but its sessions could not be deleted");
            return Err(err);
        }
        info!(identifier = %id, "identifier removed");
        Ok(id)
    }

    /// Clear the registry and every member session.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    #[instrument(name = "registry.remove_all", skip(self))]
    pub async fn remove_all(&self) -> GateResult<usize> {
        let removed = self.backend.clear().await?;
        if let Err(err) = self.sessions.clear().await {
            error!(removed, "registry cleared but member sessions could not be deleted");
            return Err(err);
        }
        info!(removed, "registry cleared");
        Ok(removed)
    }

    /// Membership check.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn contains(&self, id: &MemberId) -> GateResult<bool> {
        Ok(self.backend.contains(id).await?)
    }

    /// Every approved identifier, sorted.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn list(&self) -> GateResult<Vec<MemberId>> {
        Ok(self.backend.list().await?)
    }

    /// Number of approved identifiers.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn count(&self) -> GateResult<usize> {
        Ok(self.backend.count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::{MemoryIdentifiers, MemorySessions};
    use crate::session::ExpiryPolicy;
    use crate::sessions::Namespace;

    fn registry() -> (IdentifierRegistry, SessionStore) {
        let sessions = SessionStore::new(
            Arc::new(MemorySessions::default()),
            ExpiryPolicy::member_default(),
            Arc::new(SystemClock),
            Namespace::Member,
        );
        (
            IdentifierRegistry::new(Arc::new(MemoryIdentifiers::default()), sessions.clone()),
            sessions,
        )
    }

    fn id(raw: &str) -> MemberId {
        MemberId::parse(raw).unwrap_or_else(|err| panic!("fixture id {raw}: {err}"))
    }

    #[tokio::test]
    async fn add_then_remove_toggles_membership() -> anyhow::Result<()> {
        let (registry, _) = registry();
        registry.add("12345678").await?;
        assert!(registry.contains(&id("12345678")).await?);
        registry.remove("12345678").await?;
        assert!(!registry.contains(&id("12345678")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_and_duplicate_adds_fail() -> anyhow::Result<()> {
        let (registry, _) = registry();
        for raw in ["1234567", "123456789", "abcdefgh", ""] {
            assert!(matches!(
                registry.add(raw).await,
                Err(GateError::InvalidIdentifier { .. })
            ));
        }
        assert_eq!(registry.count().await?, 0);
        registry.add("12345678").await?;
        assert!(matches!(
            registry.add(" 12345678 ").await,
            Err(GateError::DuplicateIdentifier { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn bulk_add_skips_bad_and_repeated_tokens() -> anyhow::Result<()> {
        let (registry, _) = registry();
        let report = registry
            .add_bulk("11111111,22222222,bad,11111111")
            .await?;
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(registry.list().await?, vec![id("11111111"), id("22222222")]);

        let again = registry.add_bulk("22222222\n33333333").await?;
        assert_eq!(again.added, 1);
        assert_eq!(again.skipped, 1);
        Ok(())
    }

    #[tokio::test]
    async fn remove_cascades_only_to_that_identifier() -> anyhow::Result<()> {
        let (registry, sessions) = registry();
        registry.add_bulk("11111111,22222222").await?;
        let doomed = sessions.create_session("11111111").await?;
        let kept = sessions.create_session("22222222").await?;
        registry.remove("11111111").await?;
        assert!(sessions.verify_and_touch(doomed.token.as_str()).await.is_err());
        sessions.verify_and_touch(kept.token.as_str()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn remove_all_clears_sessions_and_allows_re_adding() -> anyhow::Result<()> {
        let (registry, sessions) = registry();
        registry.add_bulk("11111111 , 22222222").await?;
        sessions.create_session("11111111").await?;
        assert_eq!(registry.remove_all().await?, 2);
        assert_eq!(sessions.count().await?, 0);
        registry.add("11111111").await?;
        assert!(matches!(
            registry.remove("99999999").await,
            Err(GateError::IdentifierNotFound { .. })
        ));
        Ok(())
    }
}
