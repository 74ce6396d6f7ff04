//! Token service
//!
//! Issues access/refresh pairs bound to a customer's primary phone and role,
//! validates them, and rotates them on refresh. Every operation has an
//! `*_at(now)` form taking the instant explicitly; the plain forms read the
//! system clock once and delegate.

use super::jwt::{now_secs, Claims, JwtError, TokenCodec};
use milkman_core::{AuthConfig, ConfigError, Customer, CustomerStore, MilkmanError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A freshly minted access/refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub tokens: TokenPair,
    /// Identity the subject resolved to
    pub customer: Customer,
}

/// Refresh failures
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Invalid refresh token: {0}")]
    InvalidToken(JwtError),

    #[error("Refresh token has expired")]
    Expired,

    #[error("No active customer for refresh token subject")]
    IdentityNotFound,

    #[error("Customer lookup failed: {0}")]
    Store(#[from] MilkmanError),

    #[error("Failed to issue tokens: {0}")]
    Issue(JwtError),
}

impl RefreshError {
    /// Message safe to return to the caller
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Store(_) | Self::Issue(_) => "Token refresh failed",
            _ => "Invalid refresh token",
        }
    }
}

/// Token service shared by the interceptor and the customer endpoints
pub struct TokenService {
    access: TokenCodec,
    refresh: TokenCodec,
    customers: Arc<dyn CustomerStore>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access", &self.access)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build the service from validated auth configuration
    ///
    /// Fails when a secret is missing or too short, when both secrets are
    /// equal, or when a lifetime is zero.
    pub fn new(config: &AuthConfig, customers: Arc<dyn CustomerStore>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            access: TokenCodec::access(config),
            refresh: TokenCodec::refresh(config),
            customers,
        })
    }

    // ------------------------------------------------------------------
    // Issue
    // ------------------------------------------------------------------

    pub fn issue_access_token(&self, subject: &str, role: &str) -> Result<String, JwtError> {
        self.issue_access_token_at(subject, role, now_secs()?)
    }

    pub fn issue_access_token_at(&self, subject: &str, role: &str, now: u64) -> Result<String, JwtError> {
        self.access.encode_at(subject, Some(role), now)
    }

    pub fn issue_refresh_token(&self, subject: &str, role: &str) -> Result<String, JwtError> {
        self.issue_refresh_token_at(subject, role, now_secs()?)
    }

    pub fn issue_refresh_token_at(&self, subject: &str, role: &str, now: u64) -> Result<String, JwtError> {
        self.refresh.encode_at(subject, Some(role), now)
    }

    /// Issue both tokens for one identity at the same instant
    pub fn issue_pair(&self, subject: &str, role: &str) -> Result<TokenPair, JwtError> {
        self.issue_pair_at(subject, role, now_secs()?)
    }

    pub fn issue_pair_at(&self, subject: &str, role: &str, now: u64) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.issue_access_token_at(subject, role, now)?,
            refresh_token: self.issue_refresh_token_at(subject, role, now)?,
        })
    }

    // ------------------------------------------------------------------
    // Decode / extract
    // ------------------------------------------------------------------

    pub fn decode_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.access.decode(token)
    }

    pub fn decode_access_at(&self, token: &str, now: u64) -> Result<Claims, JwtError> {
        self.access.decode_at(token, now)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.refresh.decode(token)
    }

    pub fn decode_refresh_at(&self, token: &str, now: u64) -> Result<Claims, JwtError> {
        self.refresh.decode_at(token, now)
    }

    /// Subject of a valid access token
    pub fn extract_subject(&self, token: &str) -> Result<String, JwtError> {
        Ok(self.decode_access(token)?.sub)
    }

    /// Subject of a valid refresh token
    pub fn extract_subject_from_refresh(&self, token: &str) -> Result<String, JwtError> {
        Ok(self.decode_refresh(token)?.sub)
    }

    /// Role claim of a valid access token, `None` when the claim is absent
    pub fn extract_role(&self, token: &str) -> Result<Option<String>, JwtError> {
        Ok(self.decode_access(token)?.role)
    }

    // ------------------------------------------------------------------
    // Validate
    // ------------------------------------------------------------------

    /// Whether the access token decodes, is unexpired and names `expected_subject`
    pub fn validate_access(&self, token: &str, expected_subject: &str) -> bool {
        match now_secs() {
            Ok(now) => self.validate_access_at(token, expected_subject, now),
            Err(_) => false,
        }
    }

    pub fn validate_access_at(&self, token: &str, expected_subject: &str, now: u64) -> bool {
        matches!(self.decode_access_at(token, now), Ok(claims) if claims.sub == expected_subject)
    }

    pub fn validate_refresh(&self, token: &str, expected_subject: &str) -> bool {
        match now_secs() {
            Ok(now) => self.validate_refresh_at(token, expected_subject, now),
            Err(_) => false,
        }
    }

    pub fn validate_refresh_at(&self, token: &str, expected_subject: &str, now: u64) -> bool {
        matches!(self.decode_refresh_at(token, now), Ok(claims) if claims.sub == expected_subject)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, RefreshError> {
        // A clock fault is a server failure, not a bad token
        let now = now_secs().map_err(RefreshError::Issue)?;
        self.refresh_at(refresh_token, now).await
    }

    /// Exchange a refresh token for a new pair at instant `now`
    ///
    /// Both tokens are rotated. The new pair carries the customer's current
    /// stored role, not the role claim of the presented token.
    pub async fn refresh_at(&self, refresh_token: &str, now: u64) -> Result<RefreshOutcome, RefreshError> {
        let claims = self
            .decode_refresh_at(refresh_token, now)
            .map_err(|e| match e {
                JwtError::ExpiredToken => RefreshError::Expired,
                other => RefreshError::InvalidToken(other),
            })?;

        let customer = self
            .customers
            .find_active_by_phone(&claims.sub)
            .await?
            .ok_or(RefreshError::IdentityNotFound)?;

        let tokens = self
            .issue_pair_at(&customer.primary_phone, &customer.role, now)
            .map_err(RefreshError::Issue)?;

        Ok(RefreshOutcome { tokens, customer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use milkman_core::{roles, CustomerStatus, MemoryCustomerStore};
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;

    fn test_config() -> AuthConfig {
        AuthConfig {
            access_secret: "access-secret-for-tests-0123456789abcdef".to_string(),
            refresh_secret: "refresh-secret-for-tests-0123456789abcdef".to_string(),
            ..AuthConfig::default()
        }
    }

    fn service_with(store: Arc<MemoryCustomerStore>) -> TokenService {
        TokenService::new(&test_config(), store).expect("valid config")
    }

    fn service() -> TokenService {
        service_with(Arc::new(MemoryCustomerStore::new()))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let store: Arc<dyn CustomerStore> = Arc::new(MemoryCustomerStore::new());

        let missing = AuthConfig::default();
        assert!(TokenService::new(&missing, store.clone()).is_err());

        let mut same = test_config();
        same.refresh_secret = same.access_secret.clone();
        assert!(TokenService::new(&same, store).is_err());
    }

    #[test]
    fn test_server_faults_are_not_reported_as_bad_tokens() {
        use std::time::{SystemTime, UNIX_EPOCH};

        let clock = UNIX_EPOCH
            .duration_since(SystemTime::now() + std::time::Duration::from_secs(60))
            .unwrap_err();
        let err = RefreshError::Issue(JwtError::from(clock));
        assert_eq!(err.client_message(), "Token refresh failed");

        let err = RefreshError::InvalidToken(JwtError::InvalidToken);
        assert_eq!(err.client_message(), "Invalid refresh token");
    }

    #[test]
    fn test_issue_and_extract() {
        let svc = service();
        let token = svc.issue_access_token_at("9876543210", "ADMIN", NOW).unwrap();

        let claims = svc.decode_access_at(&token, NOW).unwrap();
        assert_eq!(claims.sub, "9876543210");
        assert_eq!(claims.role.as_deref(), Some("ADMIN"));
        assert_eq!(claims.exp - claims.iat, 1800);

        let refresh = svc.issue_refresh_token_at("9876543210", "ADMIN", NOW).unwrap();
        let claims = svc.decode_refresh_at(&refresh, NOW).unwrap();
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_extract_with_system_clock() {
        let svc = service();
        let pair = svc.issue_pair("9876543210", "CUSTOMER").unwrap();

        assert_eq!(svc.extract_subject(&pair.access_token).unwrap(), "9876543210");
        assert_eq!(
            svc.extract_role(&pair.access_token).unwrap().as_deref(),
            Some("CUSTOMER")
        );
        assert_eq!(
            svc.extract_subject_from_refresh(&pair.refresh_token).unwrap(),
            "9876543210"
        );
        assert!(svc.validate_access(&pair.access_token, "9876543210"));
        assert!(svc.validate_refresh(&pair.refresh_token, "9876543210"));
    }

    #[test]
    fn test_classes_never_cross_validate() {
        let svc = service();
        let pair = svc.issue_pair_at("9876543210", "CUSTOMER", NOW).unwrap();

        assert!(svc.decode_access_at(&pair.refresh_token, NOW).is_err());
        assert!(svc.decode_refresh_at(&pair.access_token, NOW).is_err());
        assert!(!svc.validate_access_at(&pair.refresh_token, "9876543210", NOW));
        assert!(!svc.validate_refresh_at(&pair.access_token, "9876543210", NOW));
    }

    #[test]
    fn test_validate_access_lifetime() {
        let svc = service();
        let token = svc.issue_access_token_at("9876543210", "CUSTOMER", NOW).unwrap();

        assert!(svc.validate_access_at(&token, "9876543210", NOW));
        assert!(svc.validate_access_at(&token, "9876543210", NOW + 1800));
        assert!(!svc.validate_access_at(&token, "9876543210", NOW + 1801));
        assert!(!svc.validate_access_at(&token, "1111111111", NOW));
        assert!(!svc.validate_access_at("garbage", "9876543210", NOW));
    }

    #[test]
    fn test_validate_refresh_lifetime() {
        let svc = service();
        let token = svc.issue_refresh_token_at("9876543210", "CUSTOMER", NOW).unwrap();

        assert!(svc.validate_refresh_at(&token, "9876543210", NOW + 604_800));
        assert!(!svc.validate_refresh_at(&token, "9876543210", NOW + 604_801));
    }

    #[test]
    fn test_distinct_identities_distinct_tokens() {
        let svc = service();
        let a = svc.issue_access_token_at("1111111111", "CUSTOMER", NOW).unwrap();
        let b = svc.issue_access_token_at("2222222222", "CUSTOMER", NOW).unwrap();
        let c = svc.issue_access_token_at("1111111111", "ADMIN", NOW).unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair_with_stored_role() {
        let store = Arc::new(MemoryCustomerStore::new());
        store
            .insert(Customer::new("Jane", "Roe", "9876543210", "hash").with_role(roles::ADMIN))
            .await
            .unwrap();
        let svc = service_with(store);

        // Presented token claims CUSTOMER; the store says ADMIN
        let old = svc.issue_refresh_token_at("9876543210", "CUSTOMER", NOW).unwrap();
        let outcome = svc.refresh_at(&old, NOW + 60).await.unwrap();

        assert_ne!(outcome.tokens.refresh_token, old);
        assert_eq!(outcome.customer.first_name, "Jane");

        let claims = svc
            .decode_access_at(&outcome.tokens.access_token, NOW + 60)
            .unwrap();
        assert_eq!(claims.sub, "9876543210");
        assert_eq!(claims.role.as_deref(), Some(roles::ADMIN));
        assert_eq!(claims.iat, NOW + 60);
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_token() {
        let store = Arc::new(MemoryCustomerStore::new());
        store
            .insert(Customer::new("Jane", "Roe", "9876543210", "hash"))
            .await
            .unwrap();
        let svc = service_with(store);

        let old = svc.issue_refresh_token_at("9876543210", "CUSTOMER", NOW).unwrap();
        let err = svc.refresh_at(&old, NOW + 604_801).await.unwrap_err();

        assert!(matches!(err, RefreshError::Expired));
        assert_eq!(err.client_message(), "Invalid refresh token");
    }

    #[tokio::test]
    async fn test_refresh_rejects_malformed_and_access_tokens() {
        let svc = service();

        let err = svc.refresh_at("not.a.token", NOW).await.unwrap_err();
        assert!(matches!(err, RefreshError::InvalidToken(_)));

        let access = svc.issue_access_token_at("9876543210", "CUSTOMER", NOW).unwrap();
        let err = svc.refresh_at(&access, NOW).await.unwrap_err();
        assert!(matches!(err, RefreshError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_refresh_requires_active_identity() {
        let store = Arc::new(MemoryCustomerStore::new());
        let mut inactive = Customer::new("Old", "Account", "5555555555", "hash");
        inactive.status = CustomerStatus::Inactive;
        store.insert(inactive).await.unwrap();
        let svc = service_with(store);

        let token = svc.issue_refresh_token_at("5555555555", "CUSTOMER", NOW).unwrap();
        let err = svc.refresh_at(&token, NOW).await.unwrap_err();
        assert!(matches!(err, RefreshError::IdentityNotFound));

        let unknown = svc.issue_refresh_token_at("0000000000", "CUSTOMER", NOW).unwrap();
        let err = svc.refresh_at(&unknown, NOW).await.unwrap_err();
        assert!(matches!(err, RefreshError::IdentityNotFound));
        assert_eq!(err.client_message(), "Invalid refresh token");
    }

    proptest! {
        #[test]
        fn prop_access_round_trip(subject in "[0-9]{10}", role in "[A-Z_]{1,16}") {
            let svc = service();
            let token = svc.issue_access_token_at(&subject, &role, NOW).unwrap();

            let claims = svc.decode_access_at(&token, NOW).unwrap();
            prop_assert_eq!(&claims.sub, &subject);
            prop_assert_eq!(claims.role.as_deref(), Some(role.as_str()));
            prop_assert!(svc.validate_access_at(&token, &subject, NOW));
            prop_assert!(!svc.validate_access_at(&token, &subject, NOW + 1801));
        }
    }
}
