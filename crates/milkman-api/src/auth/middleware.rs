//! Role authorization interceptor
//!
//! Runs in front of every route. For each request it resolves the route's
//! requirement from the `AccessPolicy`; when roles are required it reads the
//! bearer token, decodes it with the access codec and checks the role claim
//! (defaulting to `USER` when absent) for case-sensitive membership in the
//! required set. Rejections are written directly and the handler never runs.

use super::jwt::{now_secs, JwtError};
use super::policy::Requirement;
use super::tokens::TokenService;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use milkman_core::roles;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Authenticated principal extracted from an access token
///
/// Added to request extensions when a role-gated route admits the request;
/// handlers take it with `Extension<AuthenticatedCustomer>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedCustomer {
    /// Primary phone number
    pub subject: String,
    /// Role claim, or `USER` when the token carried none
    pub role: String,
    /// JWT ID
    pub jti: String,
}

impl AuthenticatedCustomer {
    pub fn is_admin(&self) -> bool {
        self.role == roles::ADMIN
    }
}

/// Interceptor rejection
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No valid bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
        }
    }

    /// Exact message returned to the client
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MissingToken => "Unauthorized: No valid token",
            Self::InvalidToken(_) => "Unauthorized: Invalid token",
            Self::InsufficientPermissions => "Forbidden: Insufficient permissions",
        }
    }
}

/// Rejection body, serialized in field order
#[derive(Debug, Serialize)]
struct RejectionBody {
    status: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = RejectionBody {
            status: "error",
            message: self.client_message(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Token from an `Authorization: Bearer <token>` header
///
/// `None` when the header is absent, not valid UTF-8, uses another scheme,
/// or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Decide whether a request meeting `requirement` may proceed at instant `now`
///
/// # Returns
///
/// * `Ok(Some(principal))` - Roles were required and the token satisfied them
/// * `Ok(None)` - Nothing to check
/// * `Err(AuthError)` - Rejected
pub fn authorize_at(
    tokens: &TokenService,
    requirement: Requirement<'_>,
    headers: &HeaderMap,
    now: u64,
) -> Result<Option<AuthenticatedCustomer>, AuthError> {
    let required = match requirement {
        Requirement::Exempt | Requirement::Open => return Ok(None),
        Requirement::Roles(required) => required,
    };

    let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    let claims = tokens.decode_access_at(token, now)?;

    let role = claims.role.unwrap_or_else(|| roles::DEFAULT.to_string());
    if !required.iter().any(|r| *r == role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(Some(AuthenticatedCustomer {
        subject: claims.sub,
        role,
        jti: claims.jti,
    }))
}

/// Role authorization middleware
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, Router};
/// use milkman_api::auth::middleware::authorize_request;
///
/// let app = Router::new()
///     .route("/customer/getAll", get(list_customers))
///     .layer(middleware::from_fn_with_state(state.clone(), authorize_request))
///     .with_state(state);
/// ```
pub async fn authorize_request(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let requirement = state.policy.resolve(&method, &path, matched.as_deref());
    if !requirement.is_checked() {
        return Ok(next.run(request).await);
    }

    let outcome = now_secs()
        .map_err(AuthError::from)
        .and_then(|now| authorize_at(&state.tokens, requirement, request.headers(), now));

    match outcome {
        Ok(Some(principal)) => {
            tracing::debug!(subject = %principal.subject, role = %principal.role, %path, "Request authorized");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Ok(None) => Ok(next.run(request).await),
        Err(err) => {
            let ip_address = extract_ip_address(request.headers());
            let user_agent = extract_user_agent(request.headers());

            match &err {
                AuthError::InsufficientPermissions => {
                    let (subject, role) = denied_identity(&state.tokens, request.headers());
                    let required_roles = match requirement {
                        Requirement::Roles(r) => r.to_vec(),
                        _ => Vec::new(),
                    };
                    audit_log(&AuditEvent::AccessDenied {
                        subject,
                        role,
                        method: method.to_string(),
                        path,
                        required_roles,
                        ip_address,
                        user_agent,
                    });
                }
                other => {
                    audit_log(&AuditEvent::InvalidToken {
                        method: method.to_string(),
                        path,
                        reason: other.to_string(),
                        ip_address,
                        user_agent,
                    });
                }
            }

            Err(err)
        }
    }
}

/// Subject and role of an already-authenticated but denied request
fn denied_identity(tokens: &TokenService, headers: &HeaderMap) -> (String, String) {
    bearer_token(headers)
        .and_then(|token| tokens.decode_access(token).ok())
        .map(|claims| {
            (
                claims.sub,
                claims.role.unwrap_or_else(|| roles::DEFAULT.to_string()),
            )
        })
        .unwrap_or_default()
}
