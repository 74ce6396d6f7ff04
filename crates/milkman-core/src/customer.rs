//! Customer identity model
//!
//! A customer's primary phone number is the subject embedded in every token
//! issued for them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles;

/// Customer account status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CustomerStatus {
    type Err = crate::MilkmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(crate::MilkmanError::ValidationError(format!(
                "Unknown customer status: {other}"
            ))),
        }
    }
}

/// A registered customer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Internal row identifier (assigned by the store)
    pub id: i64,

    /// Public customer identifier (UUID string)
    pub customer_id: String,

    pub first_name: String,
    pub last_name: String,

    /// Primary phone number - the token subject
    pub primary_phone: String,
    pub secondary_phone: Option<String>,
    pub email_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,

    /// Argon2id PHC string of the auth PIN
    #[serde(skip_serializing, default)]
    pub auth_pin_hash: String,

    pub address: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,

    pub status: CustomerStatus,

    /// Role label embedded in access tokens
    pub role: String,

    pub created_by: String,
    pub created_time: DateTime<Utc>,
    pub updated_by: String,
    pub updated_time: DateTime<Utc>,
}

impl Customer {
    /// Create a new active customer with the default `CUSTOMER` role
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        primary_phone: impl Into<String>,
        auth_pin_hash: impl Into<String>,
    ) -> Self {
        let first_name = first_name.into();
        let now = Utc::now();
        Self {
            id: 0,
            customer_id: Uuid::new_v4().to_string(),
            last_name: last_name.into(),
            primary_phone: primary_phone.into(),
            secondary_phone: None,
            email_id: None,
            date_of_birth: None,
            auth_pin_hash: auth_pin_hash.into(),
            address: None,
            pincode: None,
            landmark: None,
            status: CustomerStatus::Active,
            role: roles::CUSTOMER.to_string(),
            created_by: first_name.clone(),
            created_time: now,
            updated_by: first_name.clone(),
            updated_time: now,
            first_name,
        }
    }

    /// Set the role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Set the email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_id = Some(email.into());
        self
    }

    /// "First Last", as shown to clients
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }

    /// Whether this customer logs in with the given email or phone
    pub fn matches_login(&self, email_or_phone: &str) -> bool {
        self.primary_phone == email_or_phone || self.email_id.as_deref() == Some(email_or_phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_customer_defaults() {
        let customer = Customer::new("John", "Doe", "9876543210", "$argon2id$stub");

        assert!(customer.is_active());
        assert_eq!(customer.role, roles::CUSTOMER);
        assert_eq!(customer.full_name(), "John Doe");
        assert_eq!(customer.created_by, "John");
        assert!(Uuid::parse_str(&customer.customer_id).is_ok());
    }

    #[test]
    fn test_pin_hash_never_serialized() {
        let customer = Customer::new("John", "Doe", "9876543210", "$argon2id$secret-hash");
        let json = serde_json::to_string(&customer).unwrap();

        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"primaryPhone\":\"9876543210\""));
        assert!(json.contains("\"status\":\"ACTIVE\""));
    }

    #[test]
    fn test_matches_login() {
        let customer =
            Customer::new("Jane", "Roe", "1234567890", "hash").with_email("jane@example.com");

        assert!(customer.matches_login("1234567890"));
        assert!(customer.matches_login("jane@example.com"));
        assert!(!customer.matches_login("0987654321"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ACTIVE".parse::<CustomerStatus>().unwrap(), CustomerStatus::Active);
        assert_eq!("INACTIVE".parse::<CustomerStatus>().unwrap(), CustomerStatus::Inactive);
        assert!("active".parse::<CustomerStatus>().is_err());
    }
}
