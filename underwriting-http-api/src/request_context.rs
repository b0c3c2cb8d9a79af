//! Request-id propagation and HTTP metrics. Grounded in the
//! teacher's operator-API middleware shape (`trading-gateway/src/operator_api.rs`
//! CORS layering): a single `from_fn_with_state` wrapping the whole router.

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;
use crate::auth_middleware::AuthContext;

/// Assigns or propagates the configured request-id header and binds it to
/// the tracing span for the remainder of the request.
pub async fn request_id_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_name = state.config.request_id_header.as_str();
    let request_id = request
        .headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);
    let _entered = span.enter();

    request
        .headers_mut()
        .insert(http_header_name(header_name), HeaderValue::from_str(&request_id).unwrap());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(http_header_name(header_name), value);
    }
    response
}

fn http_header_name(name: &str) -> axum::http::HeaderName {
    axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap_or(axum::http::HeaderName::from_static("x-request-id"))
}

/// Records `http_requests_total` / `http_request_duration_ms` /
/// `http_request_errors_total`. Runs inside the auth layer so the
/// resolved tenant (if any) is visible on the request's extensions.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let tenant_id = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.tenant.tenant_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16().to_string();

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &path, &status, &tenant_id])
        .inc();
    state
        .metrics
        .http_request_duration_ms
        .with_label_values(&[&method, &path, &status, &tenant_id])
        .observe(elapsed_ms);
    if response.status().is_server_error() {
        state
            .metrics
            .http_request_errors_total
            .with_label_values(&[&method, &path, &tenant_id])
            .inc();
    }

    response
}
