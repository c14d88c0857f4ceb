//! Shared handler state.

use gatehouse_config::HttpSettings;
use gatehouse_core::{AccessController, AdminGateway, Portal};
use gatehouse_telemetry::Metrics;
use tracing::warn;

/// Services and knobs every handler can reach.
pub struct ApiState {
    pub(crate) access: AccessController,
    pub(crate) admin: AdminGateway,
    pub(crate) http: HttpSettings,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    /// Bundle the portal services with HTTP settings and the metrics registry.
    #[must_use]
    pub fn new(portal: Portal, http: HttpSettings, telemetry: Metrics) -> Self {
        Self {
            access: portal.access,
            admin: portal.admin,
            http,
            telemetry,
        }
    }

    /// Refresh the live-session gauges from both stores.
    pub(crate) async fn refresh_session_gauges(&self) {
        for store in [self.access.sessions(), self.admin.sessions()] {
            match store.count().await {
                Ok(count) => self
                    .telemetry
                    .set_live_sessions(store.namespace().as_str(), count),
                Err(err) => warn!(
                    error = %err,
                    namespace = store.namespace().as_str(),
                    "failed to count live sessions"
                ),
            }
        }
    }
}
