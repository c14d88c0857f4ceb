//! Process and request scoped tracing context.
//!
//! The HTTP layer opens a [`RequestScope`] per request; anything awaited
//! inside it, including error mapping deep in a handler, can ask which
//! request and which route template it is serving.

use std::future::Future;
use std::sync::Arc;

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Keeps the `app` span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the application span, tagging it with `storage` and the build SHA.
    #[must_use]
    pub fn new(storage: impl Into<String>) -> Self {
        let storage = storage.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            storage = %storage,
            build_sha = %build_sha()
        )));
        Self {
            _guard: span.enter(),
        }
    }
}

/// Identity of the request being served.
///
/// `route` is the matched route template (`/admin/sessions/{token}`), never
/// the raw path, so it is safe to use as a log field or metric label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    request_id: Arc<str>,
    route: Arc<str>,
}

tokio::task_local! {
    static ACTIVE_SCOPE: RequestScope;
}

impl RequestScope {
    /// Capture a request identifier and route template.
    #[must_use]
    pub fn new(request_id: &str, route: &str) -> Self {
        Self {
            request_id: Arc::from(request_id),
            route: Arc::from(route),
        }
    }

    /// Identifier propagated in `x-request-id`.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Matched route template.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Drive `fut` to completion with this scope visible to the `current_*` lookups.
    pub async fn enter<Fut>(self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        ACTIVE_SCOPE.scope(self, fut).await
    }
}

/// Scope of the request being served, if any.
#[must_use]
pub fn current_scope() -> Option<RequestScope> {
    ACTIVE_SCOPE.try_with(Clone::clone).ok()
}

/// Request identifier of the request being served, if any.
#[must_use]
pub fn current_request_id() -> Option<String> {
    ACTIVE_SCOPE
        .try_with(|scope| scope.request_id().to_string())
        .ok()
}

/// Route template of the request being served, if any.
#[must_use]
pub fn current_route() -> Option<String> {
    ACTIVE_SCOPE.try_with(|scope| scope.route().to_string()).ok()
}
