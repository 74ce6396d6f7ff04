//! Milkman API - customer authentication and role-gated HTTP surface
//!
//! The router is assembled from the customer and system routes, wrapped in
//! the role authorization interceptor and the shared HTTP layers.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, Router};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(routes::customer_routes())
        .merge(routes::system_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::authorize_request,
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::count_requests,
        ))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

/// Router over an in-memory store with random signing secrets
///
/// Secrets are generated per call, so tokens minted for one router are not
/// accepted by another.
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router(test_state())
}

/// State behind `create_router_for_testing`, for tests that mint tokens directly
#[cfg(feature = "test-utils")]
pub fn test_state() -> Arc<AppState> {
    use auth::PinHashConfig;
    use milkman_core::AppConfig;

    let mut config = AppConfig::default();
    config.auth.access_secret = format!("access-{}", uuid::Uuid::new_v4().simple());
    config.auth.refresh_secret = format!("refresh-{}", uuid::Uuid::new_v4().simple());

    let state = match AppState::in_memory(config, routes::access_policy()) {
        Ok(state) => state,
        Err(e) => panic!("test configuration rejected: {e}"),
    };
    let auth = state.auth.clone().with_pin_config(PinHashConfig {
        memory_cost: 8192,
        time_cost: 1,
        parallelism: 1,
    });

    Arc::new(state.with_auth_service(auth))
}
