//! Stream settings and geo policy singletons.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::SettingsBackend;
use crate::clock::SharedClock;
use crate::error::GateResult;
use crate::model::{GeoPolicy, GeoPolicyPatch, StreamSettings, StreamSettingsPatch};

/// Reads fall back to defaults; writes are validated and serialised.
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    clock: SharedClock,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    /// Wrap `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn SettingsBackend>, clock: SharedClock) -> Self {
        Self {
            backend,
            clock,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current stream settings, or the defaults when unset or unreadable.
    pub async fn stream_settings(&self) -> StreamSettings {
        match self.backend.load_stream().await {
            Ok(Some(settings)) => settings,
            Ok(None) => StreamSettings::default(),
            Err(err) => {
                warn!(error = %err, operation = err.operation, "stream settings unreadable; using defaults");
                StreamSettings::default()
            }
        }
    }

    /// Current geo policy, or the default when unset or unreadable.
    pub async fn geo_policy(&self) -> GeoPolicy {
        match self.backend.load_geo().await {
            Ok(Some(policy)) => policy,
            Ok(None) => GeoPolicy::default(),
            Err(err) => {
                warn!(error = %err, operation = err.operation, "geo policy unreadable; using default");
                GeoPolicy::default()
            }
        }
    }

    /// Merge `patch` into the stored stream settings.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields or a storage error when the
    /// current record cannot be read or the new one cannot be written.
    pub async fn update_stream_settings(
        &self,
        patch: StreamSettingsPatch,
    ) -> GateResult<StreamSettings> {
        let _guard = self.write_lock.lock().await;
        let current = self.backend.load_stream().await?.unwrap_or_default();
        let next = patch.apply(&current, self.clock.now())?;
        self.backend.store_stream(&next).await?;
        info!(no_stream = next.no_stream, "stream settings updated");
        Ok(next)
    }

    /// Merge `patch` into the stored geo policy.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad fields or a storage error when the
    /// current record cannot be read or the new one cannot be written.
    pub async fn update_geo_policy(&self, patch: GeoPolicyPatch) -> GateResult<GeoPolicy> {
        let _guard = self.write_lock.lock().await;
        let current = self.backend.load_geo().await?.unwrap_or_default();
        let next = patch.apply(&current)?;
        self.backend.store_geo(&next).await?;
        info!(
            enabled = next.enabled,
            countries = next.allowed_countries.len(),
            "geo policy updated"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{StorageError, StorageResult};
    use crate::memory::MemorySettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::io;

    struct BrokenSettings;

    #[async_trait]
    impl SettingsBackend for BrokenSettings {
        async fn load_stream(&self) -> StorageResult<Option<StreamSettings>> {
            Err(StorageError::new("settings.load_stream", io::Error::other("offline")))
        }

        async fn store_stream(&self, _settings: &StreamSettings) -> StorageResult<()> {
            Err(StorageError::new("settings.store_stream", io::Error::other("offline")))
        }

        async fn load_geo(&self) -> StorageResult<Option<GeoPolicy>> {
            Err(StorageError::new("settings.load_geo", io::Error::other("offline")))
        }

        async fn store_geo(&self, _policy: &GeoPolicy) -> StorageResult<()> {
            Err(StorageError::new("settings.store_geo", io::Error::other("offline")))
        }
    }

    #[tokio::test]
    async fn reads_default_when_unset_or_broken() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let empty = SettingsStore::new(Arc::new(MemorySettings::default()), clock.clone());
        assert_eq!(empty.stream_settings().await, StreamSettings::default());

        let broken = SettingsStore::new(Arc::new(BrokenSettings), clock);
        assert_eq!(broken.stream_settings().await, StreamSettings::default());
        assert_eq!(broken.geo_policy().await, GeoPolicy::default());
    }

    #[tokio::test]
    async fn writes_surface_storage_failures() {
        let store = SettingsStore::new(Arc::new(BrokenSettings), Arc::new(ManualClock::default()));
        let result = store
            .update_stream_settings(StreamSettingsPatch {
                title: Some("Replay".into()),
                ..StreamSettingsPatch::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn updates_persist_and_stamp_time() -> anyhow::Result<()> {
        let now = Utc::now();
        let store = SettingsStore::new(
            Arc::new(MemorySettings::default()),
            Arc::new(ManualClock::new(now)),
        );
        store
            .update_stream_settings(StreamSettingsPatch {
                no_stream: Some(true),
                ..StreamSettingsPatch::default()
            })
            .await?;
        let stored = store.stream_settings().await;
        assert!(stored.no_stream);
        assert_eq!(stored.last_updated, Some(now));

        store
            .update_geo_policy(GeoPolicyPatch {
                enabled: Some(true),
                allowed_countries: Some(vec!["in".into()]),
                blocked_message: None,
            })
            .await?;
        assert!(store.geo_policy().await.permits(Some("IN")));
        assert!(!store.geo_policy().await.permits(Some("US")));
        Ok(())
    }
}
