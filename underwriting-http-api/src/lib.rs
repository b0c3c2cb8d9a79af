pub mod api_error;
pub mod auth_middleware;
pub mod request_context;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use underwriting_core::{CryptoVault, Db, GatewayConfig, Metrics, Queue, RateLimiter};
use underwriting_core::auth::TokenIssuer;

/// Shared process state, grounded in the teacher's `TradingApiState`
/// (`trading-http-api/src/lib.rs`): one struct handed to every route behind
/// an `Arc`, no per-request singletons.
pub struct AppState {
    pub db: Db,
    pub vault: CryptoVault,
    pub queue: Arc<dyn Queue>,
    pub rate_limiter: RateLimiter,
    pub metrics: Arc<Metrics>,
    pub token_issuer: TokenIssuer,
    pub config: Arc<GatewayConfig>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::oauth::router())
        .merge(routes::underwrite::router())
        .merge(routes::jobs::router())
        .merge(routes::dashboard::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            request_context::metrics_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            request_context::request_id_middleware,
        ))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
