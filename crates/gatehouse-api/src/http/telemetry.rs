//! Per-route request accounting.
//!
//! Every routed request runs inside a [`RequestScope`], so handlers and
//! error mapping can log the route template they serve. The request counter
//! reads its label back from that scope.

use axum::{
    extract::{MatchedPath, Request, State},
    http,
    middleware::Next,
    response::Response,
};
use gatehouse_telemetry::{Metrics, RequestScope, current_route};

use crate::http::constants::HEADER_REQUEST_ID;

/// Route label for requests that matched nothing.
pub(crate) const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template for `request`. Raw paths would leak session tokens.
pub(crate) fn route_label<B>(request: &http::Request<B>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
}

/// Identifier assigned by the request-id layer, empty when absent.
pub(crate) fn request_id<B>(request: &http::Request<B>) -> &str {
    request
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Serve `request` inside its scope and count the response by route and status.
pub(crate) async fn track_requests(
    State(telemetry): State<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let scope = RequestScope::new(request_id(&request), route_label(&request));
    scope
        .enter(async move {
            let response = next.run(request).await;
            let route = current_route().unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
            telemetry.inc_http_request(&route, response.status().as_u16());
            response
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        Router,
        body::{Body, to_bytes},
        middleware,
        routing::delete,
    };
    use gatehouse_telemetry::current_request_id;
    use tower::ServiceExt;

    fn tracked(telemetry: &Metrics) -> Router {
        Router::new()
            .route(
                "/admin/sessions/{token}",
                delete(|| async {
                    format!(
                        "{}|{}",
                        current_route().unwrap_or_default(),
                        current_request_id().unwrap_or_default()
                    )
                }),
            )
            .route_layer(middleware::from_fn_with_state(
                telemetry.clone(),
                track_requests,
            ))
    }

    #[tokio::test]
    async fn handlers_see_the_route_template_the_counter_uses() -> Result<()> {
        let telemetry = Metrics::new()?;
        let response = tracked(&telemetry)
            .oneshot(
                http::Request::builder()
                    .method("DELETE")
                    .uri("/admin/sessions/secret-token-value")
                    .header(HEADER_REQUEST_ID, "req-9")
                    .body(Body::empty())?,
            )
            .await?;
        let body = to_bytes(response.into_body(), 1024).await?;
        assert_eq!(&body[..], b"/admin/sessions/{token}|req-9");

        let rendered = telemetry.render()?;
        assert!(rendered.contains("route=\"/admin/sessions/{token}\""));
        assert!(!rendered.contains("secret-token-value"));
        Ok(())
    }

    #[test]
    fn unrouted_requests_get_the_fallback_label() -> Result<()> {
        let request = http::Request::builder()
            .uri("/nowhere")
            .body(Body::empty())?;
        assert_eq!(route_label(&request), UNMATCHED_ROUTE);
        assert_eq!(request_id(&request), "");
        Ok(())
    }
}
