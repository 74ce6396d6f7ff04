//! Security audit logging for authentication events
//!
//! Registrations, logins, token refreshes and interceptor rejections are
//! logged at INFO level under the "audit" target, so they can be filtered
//! and routed apart from application logs:
//!
//! ```text
//! RUST_LOG=audit=info,milkman_api=warn
//! ```
//!
//! Tokens, PINs and PIN hashes are never part of an event.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for customer authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Customer registered
    RegistrationSuccess {
        customer_id: String,
        phone: String,
        role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Registration rejected by validation or a duplicate identity
    RegistrationFailure {
        phone: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Email/phone and PIN accepted
    LoginSuccess {
        customer_id: String,
        login: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Unknown login or wrong PIN
    LoginFailure {
        login: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Token pair rotated
    TokenRefresh {
        customer_id: String,
        phone: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token rejected
    TokenRefreshFailure {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Customer record changed through the update endpoint
    CustomerUpdate {
        customer_id: String,
        updated_by: String,
        fields: Vec<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Valid token whose role is outside the route's required set
    AccessDenied {
        subject: String,
        role: String,
        method: String,
        path: String,
        required_roles: Vec<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Missing, malformed, expired or wrongly signed bearer token
    InvalidToken {
        method: String,
        path: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

impl AuditEvent {
    /// Short human-readable label for the event
    pub fn label(&self) -> &'static str {
        match self {
            Self::RegistrationSuccess { .. } => "Registration successful",
            Self::RegistrationFailure { .. } => "Registration failed",
            Self::LoginSuccess { .. } => "Login successful",
            Self::LoginFailure { .. } => "Login failed",
            Self::TokenRefresh { .. } => "Token refresh",
            Self::TokenRefreshFailure { .. } => "Token refresh failed",
            Self::CustomerUpdate { .. } => "Customer updated",
            Self::AccessDenied { .. } => "Access denied",
            Self::InvalidToken { .. } => "Invalid token",
        }
    }
}

/// Request metadata attached to audit events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Client IP address (from proxy headers)
    pub ip_address: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event with structured fields
///
/// The full event is attached as JSON in the `event` field; the most useful
/// keys are also emitted as separate fields.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    let label = event.label();

    match event {
        AuditEvent::RegistrationSuccess {
            customer_id,
            phone,
            role,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                customer_id = %customer_id,
                phone = %phone,
                role = %role,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::RegistrationFailure {
            phone,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                phone = %phone,
                reason = %reason,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::LoginSuccess {
            customer_id,
            login,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                customer_id = %customer_id,
                login = %login,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::LoginFailure {
            login,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                login = %login,
                reason = %reason,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::TokenRefresh {
            customer_id,
            phone,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                customer_id = %customer_id,
                phone = %phone,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::TokenRefreshFailure {
            reason, ip_address, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::CustomerUpdate {
            customer_id,
            updated_by,
            fields,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                customer_id = %customer_id,
                updated_by = %updated_by,
                fields = ?fields,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::AccessDenied {
            subject,
            role,
            method,
            path,
            required_roles,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject = %subject,
                role = %role,
                method = %method,
                path = %path,
                required_roles = ?required_roles,
                ip_address = ?ip_address,
                "{label}"
            );
        }
        AuditEvent::InvalidToken {
            method,
            path,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                method = %method,
                path = %path,
                reason = %reason,
                ip_address = ?ip_address,
                "{label}"
            );
        }
    }
}

/// Extract the client IP address from proxy headers
///
/// Checks X-Forwarded-For (first hop) then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            customer_id: "c0ffee".to_string(),
            login: "9876543210".to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("okhttp/4.12".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"login_success\""));
        assert!(json.contains("9876543210"));
    }

    #[test]
    fn test_access_denied_serialization() {
        let event = AuditEvent::AccessDenied {
            subject: "9876543210".to_string(),
            role: "CUSTOMER".to_string(),
            method: "GET".to_string(),
            path: "/customer/getAll".to_string(),
            required_roles: vec!["ADMIN".to_string()],
            ip_address: None,
            user_agent: None,
        };

        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "access_denied");
        assert_eq!(value["required_roles"][0], "ADMIN");
        assert_eq!(event.label(), "Access denied");
    }

    #[test]
    fn test_audit_log_every_variant() {
        // Only checks that logging never panics
        let events = vec![
            AuditEvent::RegistrationSuccess {
                customer_id: "id".to_string(),
                phone: "9876543210".to_string(),
                role: "CUSTOMER".to_string(),
                ip_address: None,
                user_agent: None,
            },
            AuditEvent::RegistrationFailure {
                phone: "123".to_string(),
                reason: "Phone number must be exactly 10 digits".to_string(),
                ip_address: None,
                user_agent: None,
            },
            AuditEvent::LoginFailure {
                login: "someone@example.com".to_string(),
                reason: "Invalid credentials".to_string(),
                ip_address: Some("10.0.0.1".to_string()),
                user_agent: None,
            },
            AuditEvent::TokenRefresh {
                customer_id: "id".to_string(),
                phone: "9876543210".to_string(),
                ip_address: None,
                user_agent: None,
            },
            AuditEvent::TokenRefreshFailure {
                reason: "Refresh token has expired".to_string(),
                ip_address: None,
                user_agent: None,
            },
            AuditEvent::CustomerUpdate {
                customer_id: "id".to_string(),
                updated_by: "1234567890".to_string(),
                fields: vec!["role".to_string()],
                ip_address: None,
                user_agent: None,
            },
            AuditEvent::InvalidToken {
                method: "GET".to_string(),
                path: "/customer/getAll".to_string(),
                reason: "Invalid token signature".to_string(),
                ip_address: None,
                user_agent: None,
            },
        ];

        for event in &events {
            audit_log(event);
        }
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_audit_context_from_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());
        headers.insert(axum::http::header::USER_AGENT, "okhttp/4.12".parse().unwrap());

        let ctx = AuditContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("198.51.100.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("okhttp/4.12"));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = axum::http::HeaderMap::new();

        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
