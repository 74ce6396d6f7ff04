//! Customer API handlers
//!
//! Registration, authentication and refresh are exempt from the role
//! interceptor; the administration endpoints are gated by the access policy
//! built in `routes`.

use crate::audit::AuditContext;
use crate::auth::{
    AuthenticateRequest, AuthenticateResponse, AuthenticatedCustomer, RefreshRequest,
    RefreshResponse, RegisterRequest, RegisterResponse, UpdateCustomerRequest,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use milkman_core::Customer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Customer record as returned by the administration endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub primary_phone: String,
    pub secondary_phone: Option<String>,
    pub email_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,
    pub status: String,
    pub role: String,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

impl From<Customer> for CustomerView {
    fn from(c: Customer) -> Self {
        Self {
            status: c.status.to_string(),
            customer_id: c.customer_id,
            first_name: c.first_name,
            last_name: c.last_name,
            primary_phone: c.primary_phone,
            secondary_phone: c.secondary_phone,
            email_id: c.email_id,
            date_of_birth: c.date_of_birth,
            address: c.address,
            pincode: c.pincode,
            landmark: c.landmark,
            role: c.role,
            created_time: c.created_time,
            updated_time: c.updated_time,
        }
    }
}

/// Register a new customer
///
/// The outcome is carried in `status` / `statusCode`; validation failures
/// (400) and duplicates (409) are reported in the body.
#[utoipa::path(
    post,
    path = "/customer/register",
    tag = "customer",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration outcome", body = RegisterResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    let response = state.auth.register(request, &ctx).await?;

    Ok(Json(response))
}

/// Authenticate with email or phone plus PIN
///
/// Returns an access/refresh token pair on success, `FAILED` / `404`
/// otherwise.
#[utoipa::path(
    post,
    path = "/customer/authenticate",
    tag = "customer",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Authentication outcome", body = AuthenticateResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn authenticate_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AuthenticateRequest>,
) -> Result<Json<AuthenticateResponse>, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    let response = state.auth.authenticate(request, &ctx).await?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/customer/refresh-token",
    tag = "customer",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh outcome", body = RefreshResponse),
    )
)]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Json<RefreshResponse> {
    let ctx = AuditContext::from_headers(&headers);
    Json(state.auth.refresh(request, &ctx).await)
}

/// List every customer (ADMIN)
#[utoipa::path(
    get,
    path = "/customer/getAll",
    tag = "customer",
    responses(
        (status = 200, description = "All customers", body = [CustomerView]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CustomerView>>, AppError> {
    let customers = state.customers.list().await?;
    tracing::info!(count = customers.len(), "Listed customers");

    Ok(Json(customers.into_iter().map(CustomerView::from).collect()))
}

/// Fetch one customer (ADMIN, or the CUSTOMER it belongs to)
#[utoipa::path(
    get,
    path = "/customer/{customer_id}",
    tag = "customer",
    params(
        ("customer_id" = String, Path, description = "Public customer identifier")
    ),
    responses(
        (status = 200, description = "Customer record", body = CustomerView),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not the caller's record", body = crate::error::ApiError),
        (status = 404, description = "Customer not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<AuthenticatedCustomer>>,
    Path(customer_id): Path<String>,
) -> Result<Json<CustomerView>, AppError> {
    let Some(Extension(principal)) = principal else {
        return Err(AppError::Forbidden("Access denied".to_string()));
    };

    let customer = state.customers.find_by_customer_id(&customer_id).await?;

    if principal.is_admin() {
        let customer = customer.ok_or_else(|| AppError::NotFound("Customer".to_string()))?;
        return Ok(Json(customer.into()));
    }

    // Non-admins cannot discover other customers' identifiers
    match customer {
        Some(c) if c.primary_phone == principal.subject => Ok(Json(c.into())),
        _ => Err(AppError::Forbidden(
            "Customers may only read their own record".to_string(),
        )),
    }
}

/// Update a customer (ADMIN, or the CUSTOMER it belongs to)
///
/// Only admins may change `role` or `status`.
#[utoipa::path(
    put,
    path = "/customer/update",
    tag = "customer",
    request_body = UpdateCustomerRequest,
    responses(
        (status = 200, description = "Updated customer record", body = CustomerView),
        (status = 400, description = "Invalid field value", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Not the caller's record, or a restricted field", body = crate::error::ApiError),
        (status = 404, description = "Customer not found", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<AuthenticatedCustomer>>,
    headers: HeaderMap,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<CustomerView>, AppError> {
    let Some(Extension(principal)) = principal else {
        return Err(AppError::Forbidden("Access denied".to_string()));
    };

    let ctx = AuditContext::from_headers(&headers);
    let customer = state.auth.update(request, &principal, &ctx).await?;

    Ok(Json(customer.into()))
}

/// Delete a customer (ADMIN)
#[utoipa::path(
    delete,
    path = "/customer/{customer_id}",
    tag = "customer",
    params(
        ("customer_id" = String, Path, description = "Public customer identifier")
    ),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "Customer not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.customers.delete(&customer_id).await? {
        return Err(AppError::NotFound("Customer".to_string()));
    }

    tracing::info!(%customer_id, "Customer deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_view_hides_pin_hash() {
        let customer = Customer::new("Jane", "Roe", "9876543210", "$argon2id$v=19$secret");
        let view = CustomerView::from(customer);

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"customerId\""));
        assert!(json.contains("\"status\":\"ACTIVE\""));
        assert!(json.contains("\"role\":\"CUSTOMER\""));
    }
}
