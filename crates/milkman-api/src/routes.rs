//! API route definitions and access policy

use crate::auth::policy::AccessPolicy;
use crate::auth::{
    AuthenticateRequest, AuthenticateResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, UpdateCustomerRequest,
};
use crate::error::ApiError;
use crate::handlers::{customer, health};
use crate::state::AppState;
use axum::{
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use milkman_core::roles;
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Route patterns as registered with the router
pub mod paths {
    pub const REGISTER: &str = "/customer/register";
    pub const AUTHENTICATE: &str = "/customer/authenticate";
    pub const REFRESH_TOKEN: &str = "/customer/refresh-token";
    pub const GET_ALL: &str = "/customer/getAll";
    pub const UPDATE: &str = "/customer/update";
    pub const CUSTOMER: &str = "/customer/:customer_id";
    pub const HEALTH: &str = "/health";
    pub const READY: &str = "/ready";
    pub const OPENAPI: &str = "/api-docs/openapi.json";
}

/// Role requirements for every gated route
///
/// Paths not listed here have no requirement.
pub fn access_policy() -> AccessPolicy {
    AccessPolicy::new()
        .exempt(paths::REGISTER)
        .exempt(paths::AUTHENTICATE)
        .exempt(paths::REFRESH_TOKEN)
        .exempt(paths::HEALTH)
        .exempt(paths::READY)
        .exempt("/api-docs/*")
        .route(Method::GET, paths::GET_ALL, &[roles::ADMIN])
        .route(Method::GET, paths::CUSTOMER, &[roles::ADMIN, roles::CUSTOMER])
        .route(Method::PUT, paths::UPDATE, &[roles::ADMIN, roles::CUSTOMER])
        .route(Method::DELETE, paths::CUSTOMER, &[roles::ADMIN])
}

/// Customer routes
pub fn customer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(paths::REGISTER, post(customer::register_customer))
        .route(paths::AUTHENTICATE, post(customer::authenticate_customer))
        .route(paths::REFRESH_TOKEN, post(customer::refresh_token))
        .route(paths::GET_ALL, get(customer::list_customers))
        .route(paths::UPDATE, put(customer::update_customer))
        .route(
            paths::CUSTOMER,
            get(customer::get_customer).delete(customer::delete_customer),
        )
}

/// Health and documentation routes
pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(paths::HEALTH, get(health::health_check))
        .route(paths::READY, get(health::readiness_check))
        .route(paths::OPENAPI, get(openapi_json))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        customer::register_customer,
        customer::authenticate_customer,
        customer::refresh_token,
        customer::list_customers,
        customer::get_customer,
        customer::update_customer,
        customer::delete_customer,
        health::health_check,
        health::readiness_check,
    ),
    components(schemas(
        RegisterRequest,
        RegisterResponse,
        AuthenticateRequest,
        AuthenticateResponse,
        RefreshRequest,
        RefreshResponse,
        UpdateCustomerRequest,
        customer::CustomerView,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        ApiError,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "customer", description = "Customer registration, authentication and administration"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::policy::Requirement;

    #[test]
    fn test_customer_routes_policy() {
        let policy = access_policy();

        assert_eq!(
            policy.resolve(&Method::POST, paths::REGISTER, Some(paths::REGISTER)),
            Requirement::Exempt
        );
        assert_eq!(
            policy.resolve(&Method::GET, "/api-docs/openapi.json", Some(paths::OPENAPI)),
            Requirement::Exempt
        );

        match policy.resolve(&Method::GET, paths::GET_ALL, Some(paths::GET_ALL)) {
            Requirement::Roles(r) => assert_eq!(r, ["ADMIN".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        match policy.resolve(&Method::GET, "/customer/abc", Some(paths::CUSTOMER)) {
            Requirement::Roles(r) => assert_eq!(r.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match policy.resolve(&Method::PUT, paths::UPDATE, Some(paths::UPDATE)) {
            Requirement::Roles(r) => assert_eq!(r.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match policy.resolve(&Method::DELETE, "/customer/abc", Some(paths::CUSTOMER)) {
            Requirement::Roles(r) => assert_eq!(r, ["ADMIN".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_openapi_document() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json["paths"]["/customer/register"].is_object());
        assert!(json["paths"]["/customer/{customer_id}"]["delete"].is_object());
        assert!(json["paths"]["/customer/update"]["put"].is_object());
        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
