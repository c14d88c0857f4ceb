//! Router construction and server host for the API.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Method, Request, header::AUTHORIZATION, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use gatehouse_telemetry::{build_sha, propagate_request_id_layer, set_request_id_layer};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, error, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::admin::{
    add_identifier, add_identifiers_bulk, admin_login, admin_logout, clear_sessions, dashboard,
    get_geo_policy, get_stream_settings, kick_session, patch_geo_policy, patch_stream_settings,
    remove_all_identifiers, remove_identifier,
};
use crate::http::auth::require_admin;
use crate::http::constants::{HEADER_ADMIN_TOKEN, HEADER_MEMBER_TOKEN};
use crate::http::errors::ApiError;
use crate::http::health::{health, metrics};
use crate::http::member::{access, login, logout, logout_all, status, stream};
use crate::http::telemetry::{request_id, route_label, track_requests};
use crate::state::ApiState;

/// Axum router wrapper that hosts the portal API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over `state`.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let state = Arc::new(state);
        let telemetry = state.telemetry.clone();

        let cors_layer = CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static(HEADER_MEMBER_TOKEN),
                HeaderName::from_static(HEADER_ADMIN_TOKEN),
            ]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %route_label(request),
                    request_id = %request_id(request),
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(|response: &Response, latency: Duration, span: &Span| {
                span.record("status_code", response.status().as_u16());
                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                span.record("latency_ms", latency_ms);
            });
        let layered = ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(propagate_request_id_layer())
            .layer(trace_layer)
            .layer(middleware::from_fn_with_state(telemetry, track_requests));

        let router = Self::build_router(&state)
            .route_layer(layered)
            .layer(cors_layer)
            .layer(CatchPanicLayer::custom(panic_response))
            .with_state(state);

        Self { router }
    }

    fn build_router(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        Self::public_routes()
            .merge(Self::member_routes())
            .merge(Self::admin_routes(state))
    }

    fn public_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
    }

    fn member_routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/api/login", post(login))
            .route("/api/status", get(status))
            .route("/api/access", get(access))
            .route("/api/stream", get(stream))
            .route("/api/logout", post(logout))
            .route("/api/logout-all", post(logout_all))
    }

    fn admin_routes(state: &Arc<ApiState>) -> Router<Arc<ApiState>> {
        let guarded = Router::new()
            .route("/admin/logout", post(admin_logout))
            .route("/admin/dashboard", get(dashboard))
            .route(
                "/admin/identifiers",
                post(add_identifier).delete(remove_all_identifiers),
            )
            .route("/admin/identifiers/bulk", post(add_identifiers_bulk))
            .route("/admin/identifiers/{id}", delete(remove_identifier))
            .route("/admin/sessions", delete(clear_sessions))
            .route("/admin/sessions/{token}", delete(kick_session))
            .route(
                "/admin/settings/stream",
                get(get_stream_settings).patch(patch_stream_settings),
            )
            .route(
                "/admin/settings/geo",
                get(get_geo_policy).patch(patch_geo_policy),
            )
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(state),
                require_admin,
            ));

        Router::new()
            .route("/admin/login", post(admin_login))
            .merge(guarded)
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server loop fails.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(%addr, "api listening");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }

    /// Router with state applied, for embedding or in-process requests.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    error!(panic = %message, "request handler panicked");
    ApiError::internal("The request could not be completed.").into_response()
}
