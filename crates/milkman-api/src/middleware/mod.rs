//! Cross-cutting HTTP middleware
//!
//! Role authorization lives in `auth::middleware`; this module holds the
//! layers applied to every response regardless of route.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Count every request handled by the server
pub async fn count_requests(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    state.increment_requests();
    next.run(request).await
}

/// Response headers for an API that returns bearer credentials in bodies
///
/// - `Cache-Control: no-store` and `Pragma: no-cache` keep tokens out of caches
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    response
}
