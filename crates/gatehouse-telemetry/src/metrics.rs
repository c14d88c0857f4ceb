//! Prometheus registry for portal traffic and session churn.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use serde::Serialize;

use crate::error::{CollectorStage, ExpositionFailure, Result, TelemetryError};

/// Login outcome label for successful sign-ins.
pub const LOGIN_ACCEPTED: &str = "accepted";

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    logins_total: IntCounterVec,
    live_sessions: IntGaugeVec,
    sessions_reaped_total: IntCounterVec,
    admin_mutations_total: IntCounterVec,
    region_blocked_total: IntCounter,
}

/// Point-in-time view used by health reporting and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Live member sessions at the last refresh.
    pub live_member_sessions: i64,
    /// Live administrator sessions at the last refresh.
    pub live_admin_sessions: i64,
    /// Successful member logins.
    pub logins_accepted_total: u64,
    /// Sessions removed by expiry across namespaces.
    pub sessions_reaped_total: u64,
    /// Requests refused by the geographic policy.
    pub region_blocked_total: u64,
}

impl Metrics {
    /// Build the registry with every collector registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = collector(
            "http_requests_total",
            IntCounterVec::new(
                Opts::new("http_requests_total", "HTTP requests served by route and status"),
                &["route", "code"],
            ),
        )?;
        let logins_total = collector(
            "logins_total",
            IntCounterVec::new(
                Opts::new("logins_total", "Member login attempts by outcome"),
                &["outcome"],
            ),
        )?;
        let live_sessions = collector(
            "live_sessions",
            IntGaugeVec::new(
                Opts::new("live_sessions", "Live sessions by namespace"),
                &["namespace"],
            ),
        )?;
        let sessions_reaped_total = collector(
            "sessions_reaped_total",
            IntCounterVec::new(
                Opts::new("sessions_reaped_total", "Expired sessions removed by namespace"),
                &["namespace"],
            ),
        )?;
        let admin_mutations_total = collector(
            "admin_mutations_total",
            IntCounterVec::new(
                Opts::new("admin_mutations_total", "Administrator mutations by operation"),
                &["operation"],
            ),
        )?;
        let region_blocked_total = collector(
            "region_blocked_total",
            IntCounter::with_opts(Opts::new(
                "region_blocked_total",
                "Requests refused by the geographic policy",
            )),
        )?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "logins_total", &logins_total)?;
        register(&registry, "live_sessions", &live_sessions)?;
        register(&registry, "sessions_reaped_total", &sessions_reaped_total)?;
        register(&registry, "admin_mutations_total", &admin_mutations_total)?;
        register(&registry, "region_blocked_total", &region_blocked_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                logins_total,
                live_sessions,
                sessions_reaped_total,
                admin_mutations_total,
                region_blocked_total,
            }),
        })
    }

    /// Count one served request.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count one login attempt; `outcome` is [`LOGIN_ACCEPTED`] or an error kind label.
    pub fn inc_login(&self, outcome: &str) {
        self.inner.logins_total.with_label_values(&[outcome]).inc();
    }

    /// Set the live session gauge for a namespace.
    pub fn set_live_sessions(&self, namespace: &str, count: usize) {
        self.inner
            .live_sessions
            .with_label_values(&[namespace])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Add reaped sessions for a namespace.
    pub fn add_sessions_reaped(&self, namespace: &str, count: usize) {
        self.inner
            .sessions_reaped_total
            .with_label_values(&[namespace])
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Count one administrator mutation.
    pub fn inc_admin_mutation(&self, operation: &str) {
        self.inner
            .admin_mutations_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Count one geographic refusal.
    pub fn inc_region_blocked(&self) {
        self.inner.region_blocked_total.inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(ExpositionFailure::Encode)?;
        Ok(String::from_utf8(buffer).map_err(ExpositionFailure::NotUtf8)?)
    }

    /// Snapshot the gauges and counters surfaced outside Prometheus.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let reaped = ["member", "admin"]
            .iter()
            .map(|ns| self.inner.sessions_reaped_total.with_label_values(&[*ns]).get())
            .sum();
        MetricsSnapshot {
            live_member_sessions: self.inner.live_sessions.with_label_values(&["member"]).get(),
            live_admin_sessions: self.inner.live_sessions.with_label_values(&["admin"]).get(),
            logins_accepted_total: self
                .inner
                .logins_total
                .with_label_values(&[LOGIN_ACCEPTED])
                .get(),
            sessions_reaped_total: reaped,
            region_blocked_total: self.inner.region_blocked_total.get(),
        }
    }
}

fn collector<C>(name: &'static str, built: prometheus::Result<C>) -> Result<C> {
    built.map_err(|source| TelemetryError::collector(name, CollectorStage::Build, source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::collector(name, CollectorStage::Register, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/api/login", 200);
        metrics.inc_login(LOGIN_ACCEPTED);
        metrics.inc_login("conflict");
        metrics.set_live_sessions("member", 3);
        metrics.set_live_sessions("admin", 1);
        metrics.add_sessions_reaped("member", 2);
        metrics.add_sessions_reaped("admin", 1);
        metrics.inc_admin_mutation("add_identifier");
        metrics.inc_region_blocked();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                live_member_sessions: 3,
                live_admin_sessions: 1,
                logins_accepted_total: 1,
                sessions_reaped_total: 3,
                region_blocked_total: 1,
            }
        );

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("logins_total{outcome=\"conflict\"} 1"));
        assert!(rendered.contains("admin_mutations_total"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_region_blocked();
        assert_eq!(second.snapshot().region_blocked_total, 0);
        Ok(())
    }
}
