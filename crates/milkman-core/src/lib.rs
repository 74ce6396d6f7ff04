//! Milkman Core - configuration, customer identities and shared types
//!
//! This crate defines the pieces shared by the API server and the CLI:
//! - Configuration loading (environment, TOML file)
//! - The core error type
//! - Role labels carried inside access tokens
//! - The customer identity model
//! - The `CustomerStore` trait with in-memory and PostgreSQL backends

pub mod config;
pub mod customer;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig};
pub use customer::{Customer, CustomerStatus};
pub use store::{CustomerStore, MemoryCustomerStore, PgCustomerStore};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Milkman operations
#[derive(Error, Debug)]
pub enum MilkmanError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

pub type Result<T> = std::result::Result<T, MilkmanError>;

// ============================================================================
// Roles
// ============================================================================

/// Role labels embedded in access tokens.
///
/// Roles are open strings; these are the ones the service assigns itself.
/// Matching is always case-sensitive.
pub mod roles {
    /// Full administrative access
    pub const ADMIN: &str = "ADMIN";

    /// Role given to every self-registered customer
    pub const CUSTOMER: &str = "CUSTOMER";

    /// Role assumed when an access token carries no role claim.
    /// Never listed in a route requirement.
    pub const DEFAULT: &str = "USER";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MilkmanError::NotFound("customer 42".to_string());
        assert_eq!(err.to_string(), "Entity not found: customer 42");

        let err = MilkmanError::Conflict("phone already registered".to_string());
        assert!(err.to_string().contains("phone already registered"));
    }

    #[test]
    fn test_default_role_is_unprivileged() {
        assert_ne!(roles::DEFAULT, roles::ADMIN);
        assert_ne!(roles::DEFAULT, roles::CUSTOMER);
    }
}
