//! Customer authentication service
//!
//! Registration, PIN authentication and token refresh. Outcomes are reported
//! in the response body (`status` / `statusCode`) rather than through the HTTP
//! status, so mobile clients read a single shape; only store failures surface
//! as `AppError`.

use super::middleware::AuthenticatedCustomer;
use super::pin::{hash_pin_with_config, validate_pin, verify_pin, PinHashConfig};
use super::tokens::TokenService;
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use chrono::{NaiveDate, Utc};
use milkman_core::{Customer, CustomerStatus, CustomerStore, MilkmanError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const SUCCESS: &str = "SUCCESS";
pub const FAILED: &str = "FAILED";
pub const SUCCESS_CODE: &str = "200";
pub const BAD_REQUEST_CODE: &str = "400";
pub const NOT_FOUND_CODE: &str = "404";
pub const CONFLICT_CODE: &str = "409";

const ALREADY_REGISTERED: &str = "Phone number or email already registered";

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";

static EMAIL_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(EMAIL_PATTERN));

fn is_valid_email(email: &str) -> Result<bool, AppError> {
    match &*EMAIL_RE {
        Ok(re) => Ok(re.is_match(email)),
        Err(e) => Err(AppError::Internal(format!("Email pattern: {e}"))),
    }
}

/// Exactly ten ASCII digits
fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit())
}

/// Trimmed value, `None` when blank
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(label: &str, value: String) -> Result<String, AppError> {
    non_blank(Some(value)).ok_or_else(|| AppError::BadRequest(format!("{label} must not be blank")))
}

// ============================================================================
// Request / response types
// ============================================================================

/// Customer registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub primary_phone: String,
    pub secondary_phone: Option<String>,
    pub email_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub auth_pin: String,
    pub address: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,
}

/// Registration outcome
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: String,
    pub status_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl RegisterResponse {
    fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: FAILED.to_string(),
            status_code: code.to_string(),
            error_msg: Some(message.into()),
            customer_name: None,
            customer_id: None,
        }
    }
}

/// Login with email or phone plus PIN
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub email_id_or_phone: String,
    #[serde(default)]
    pub auth_pin: String,
}

/// Login outcome
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub status: String,
    pub status_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AuthenticateResponse {
    fn failed() -> Self {
        Self {
            status: FAILED.to_string(),
            status_code: NOT_FOUND_CODE.to_string(),
            auth_token: None,
            refresh_token: None,
            customer_name: None,
            customer_id: None,
            role: None,
        }
    }
}

/// Token refresh request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Token refresh outcome
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RefreshResponse {
    fn failed(message: &str) -> Self {
        Self {
            status: FAILED.to_string(),
            auth_token: None,
            refresh_token: None,
            customer_id: None,
            customer_name: None,
            role: None,
            message: Some(message.to_string()),
        }
    }
}

/// Partial customer update
///
/// Absent fields are left unchanged; a blank optional field clears it. The
/// primary phone is the token subject and cannot be changed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    #[serde(default)]
    pub customer_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub secondary_phone: Option<String>,
    pub email_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub auth_pin: Option<String>,
    pub address: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,
    /// ADMIN only
    pub role: Option<String>,
    /// ADMIN only
    #[schema(value_type = Option<String>, example = "INACTIVE")]
    pub status: Option<CustomerStatus>,
}

// ============================================================================
// Service
// ============================================================================

fn reject_registration(
    phone: String,
    code: &str,
    reason: String,
    ctx: &AuditContext,
) -> RegisterResponse {
    tracing::warn!(%phone, %reason, "Registration rejected");
    audit_log(&AuditEvent::RegistrationFailure {
        phone,
        reason: reason.clone(),
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
    });
    RegisterResponse::failed(code, reason)
}

/// Customer authentication service
#[derive(Clone)]
pub struct AuthService {
    tokens: Arc<TokenService>,
    customers: Arc<dyn CustomerStore>,
    pin_config: PinHashConfig,
}

impl AuthService {
    pub fn new(tokens: Arc<TokenService>, customers: Arc<dyn CustomerStore>) -> Self {
        Self {
            tokens,
            customers,
            pin_config: PinHashConfig::default(),
        }
    }

    /// Override the Argon2 cost parameters used for new PINs
    pub fn with_pin_config(mut self, pin_config: PinHashConfig) -> Self {
        self.pin_config = pin_config;
        self
    }

    /// Register a new customer
    ///
    /// Validation failures and duplicates come back as a `FAILED` response
    /// with status code 400 or 409.
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &AuditContext,
    ) -> Result<RegisterResponse, AppError> {
        let phone = request.primary_phone.trim().to_string();
        let email = non_blank(request.email_id);

        tracing::info!(%phone, "Registering customer");

        let email_ok = match email.as_deref() {
            Some(e) => is_valid_email(e)?,
            None => true,
        };

        let rejection = if !email_ok {
            Some((BAD_REQUEST_CODE, "Invalid email format".to_string()))
        } else if !is_valid_phone(&phone) {
            Some((BAD_REQUEST_CODE, "Phone number must be exactly 10 digits".to_string()))
        } else if let Err(msg) = validate_pin(&request.auth_pin) {
            Some((BAD_REQUEST_CODE, msg))
        } else if !self
            .customers
            .find_active_conflicts(email.as_deref(), &phone)
            .await?
            .is_empty()
        {
            Some((CONFLICT_CODE, ALREADY_REGISTERED.to_string()))
        } else {
            None
        };

        if let Some((code, reason)) = rejection {
            return Ok(reject_registration(phone, code, reason, ctx));
        }

        let pin_hash = hash_pin_with_config(&request.auth_pin, &self.pin_config)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let mut customer = Customer::new(
            request.first_name.trim(),
            request.last_name.trim(),
            phone.clone(),
            pin_hash,
        );
        customer.email_id = email;
        customer.secondary_phone = non_blank(request.secondary_phone);
        customer.date_of_birth = request.date_of_birth;
        customer.address = non_blank(request.address);
        customer.pincode = non_blank(request.pincode);
        customer.landmark = non_blank(request.landmark);

        // A concurrent registration may win between the check above and here
        let customer = match self.customers.insert(customer).await {
            Ok(customer) => customer,
            Err(MilkmanError::Conflict(_)) => {
                return Ok(reject_registration(
                    phone,
                    CONFLICT_CODE,
                    ALREADY_REGISTERED.to_string(),
                    ctx,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(customer_id = %customer.customer_id, "Customer registered");
        audit_log(&AuditEvent::RegistrationSuccess {
            customer_id: customer.customer_id.clone(),
            phone,
            role: customer.role.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(RegisterResponse {
            status: SUCCESS.to_string(),
            status_code: SUCCESS_CODE.to_string(),
            error_msg: None,
            customer_name: Some(customer.full_name()),
            customer_id: Some(customer.customer_id),
        })
    }

    /// Authenticate by email or phone plus PIN
    ///
    /// Unknown logins and wrong PINs produce the same `FAILED`/`404` response.
    pub async fn authenticate(
        &self,
        request: AuthenticateRequest,
        ctx: &AuditContext,
    ) -> Result<AuthenticateResponse, AppError> {
        let login = request.email_id_or_phone.trim().to_string();
        tracing::info!(%login, "Login attempt");

        let customer = match self.customers.find_active_by_login(&login).await? {
            Some(customer) if self.pin_matches(&request.auth_pin, &customer) => customer,
            found => {
                let reason = if found.is_some() { "Wrong PIN" } else { "Unknown login" };
                tracing::warn!(%login, reason, "Login failed");
                audit_log(&AuditEvent::LoginFailure {
                    login,
                    reason: reason.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                return Ok(AuthenticateResponse::failed());
            }
        };

        let tokens = self
            .tokens
            .issue_pair(&customer.primary_phone, &customer.role)
            .map_err(|e| AppError::Internal(format!("Failed to issue tokens: {e}")))?;

        audit_log(&AuditEvent::LoginSuccess {
            customer_id: customer.customer_id.clone(),
            login,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(AuthenticateResponse {
            status: SUCCESS.to_string(),
            status_code: SUCCESS_CODE.to_string(),
            auth_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            customer_name: Some(customer.full_name()),
            customer_id: Some(customer.customer_id),
            role: Some(customer.role),
        })
    }

    fn pin_matches(&self, pin: &str, customer: &Customer) -> bool {
        match verify_pin(pin, &customer.auth_pin_hash) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(customer_id = %customer.customer_id, error = %e, "Stored PIN hash unreadable");
                false
            }
        }
    }

    /// Apply a partial update on behalf of `principal`
    ///
    /// Admins may update any record, including `role` and `status`. Everyone
    /// else may only touch their own record, and gets `Forbidden` for a
    /// record that is missing or belongs to someone else.
    pub async fn update(
        &self,
        request: UpdateCustomerRequest,
        principal: &AuthenticatedCustomer,
        ctx: &AuditContext,
    ) -> Result<Customer, AppError> {
        let customer_id = request.customer_id.trim();
        let existing = self.customers.find_by_customer_id(customer_id).await?;

        let mut customer = if principal.is_admin() {
            existing.ok_or_else(|| AppError::NotFound("Customer".to_string()))?
        } else {
            match existing {
                Some(c) if c.primary_phone == principal.subject => c,
                _ => {
                    return Err(AppError::Forbidden(
                        "Customers may only update their own record".to_string(),
                    ))
                }
            }
        };

        if !principal.is_admin() && (request.role.is_some() || request.status.is_some()) {
            return Err(AppError::Forbidden(
                "Only administrators may change role or status".to_string(),
            ));
        }

        let mut fields: Vec<String> = Vec::new();

        if let Some(name) = request.first_name {
            customer.first_name = required("First name", name)?;
            fields.push("firstName".to_string());
        }
        if let Some(name) = request.last_name {
            customer.last_name = required("Last name", name)?;
            fields.push("lastName".to_string());
        }
        if let Some(phone) = request.secondary_phone {
            let phone = non_blank(Some(phone));
            if phone.as_deref().is_some_and(|p| !is_valid_phone(p)) {
                return Err(AppError::BadRequest(
                    "Phone number must be exactly 10 digits".to_string(),
                ));
            }
            customer.secondary_phone = phone;
            fields.push("secondaryPhone".to_string());
        }
        if let Some(email) = request.email_id {
            let email = non_blank(Some(email));
            if let Some(e) = email.as_deref() {
                if !is_valid_email(e)? {
                    return Err(AppError::BadRequest("Invalid email format".to_string()));
                }
            }
            customer.email_id = email;
            fields.push("emailId".to_string());
        }
        if let Some(dob) = request.date_of_birth {
            customer.date_of_birth = Some(dob);
            fields.push("dateOfBirth".to_string());
        }
        if let Some(pin) = request.auth_pin {
            validate_pin(&pin).map_err(AppError::BadRequest)?;
            customer.auth_pin_hash = hash_pin_with_config(&pin, &self.pin_config)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            fields.push("authPin".to_string());
        }
        if let Some(address) = request.address {
            customer.address = non_blank(Some(address));
            fields.push("address".to_string());
        }
        if let Some(pincode) = request.pincode {
            customer.pincode = non_blank(Some(pincode));
            fields.push("pincode".to_string());
        }
        if let Some(landmark) = request.landmark {
            customer.landmark = non_blank(Some(landmark));
            fields.push("landmark".to_string());
        }
        if let Some(role) = request.role {
            customer.role = required("Role", role)?;
            fields.push("role".to_string());
        }
        if let Some(status) = request.status {
            customer.status = status;
            fields.push("status".to_string());
        }

        if fields.is_empty() {
            return Ok(customer);
        }

        customer.updated_by = principal.subject.clone();
        customer.updated_time = Utc::now();

        let customer = self.customers.update(customer).await?;

        tracing::info!(customer_id = %customer.customer_id, ?fields, "Customer updated");
        audit_log(&AuditEvent::CustomerUpdate {
            customer_id: customer.customer_id.clone(),
            updated_by: principal.subject.clone(),
            fields,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(customer)
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, request: RefreshRequest, ctx: &AuditContext) -> RefreshResponse {
        match self.tokens.refresh(request.refresh_token.trim()).await {
            Ok(outcome) => {
                let customer = outcome.customer;
                tracing::info!(customer_id = %customer.customer_id, "Tokens refreshed");
                audit_log(&AuditEvent::TokenRefresh {
                    customer_id: customer.customer_id.clone(),
                    phone: customer.primary_phone.clone(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });

                RefreshResponse {
                    status: SUCCESS.to_string(),
                    auth_token: Some(outcome.tokens.access_token),
                    refresh_token: Some(outcome.tokens.refresh_token),
                    customer_name: Some(customer.full_name()),
                    customer_id: Some(customer.customer_id),
                    role: Some(customer.role),
                    message: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected");
                audit_log(&AuditEvent::TokenRefreshFailure {
                    reason: e.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                RefreshResponse::failed(e.client_message())
            }
        }
    }
}
