//! Shared fixtures for handler and router tests.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use gatehouse_config::HttpSettings;
use gatehouse_core::{ExpiryPolicy, ManualClock, Portal, memory_backends};
use gatehouse_telemetry::Metrics;

use crate::state::ApiState;

pub(crate) const ADMIN_USER: &str = "admin";
pub(crate) const ADMIN_PASSWORD: &str = "correct horse battery staple";
pub(crate) const COUNTRY_HEADER: &str = "cf-ipcountry";

pub(crate) struct Harness {
    pub(crate) state: Arc<ApiState>,
    pub(crate) clock: ManualClock,
}

pub(crate) async fn harness() -> Harness {
    let clock = ManualClock::new(Utc::now());
    let portal = Portal::assemble(
        memory_backends(),
        ExpiryPolicy::member_default(),
        ExpiryPolicy::admin_default(),
        Arc::new(clock.clone()),
    );
    portal
        .admin
        .ensure_credential(ADMIN_USER, ADMIN_PASSWORD)
        .await
        .expect("provision admin credential");
    let http = HttpSettings {
        cookie_secure: false,
        country_header: COUNTRY_HEADER.to_string(),
    };
    let telemetry = Metrics::new().expect("metrics registry");
    Harness {
        state: Arc::new(ApiState::new(portal, http, telemetry)),
        clock,
    }
}

pub(crate) fn headers_with(name: &'static str, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(name, HeaderValue::from_str(value).expect("header value"));
    headers
}
