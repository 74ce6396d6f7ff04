//! JWT token encoding and decoding
//!
//! Implements the token codec with HMAC-SHA256 signing. One codec exists per
//! token class: access and refresh codecs hold independent secrets and
//! lifetimes, and each one only accepts tokens of its own class.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use milkman_core::AuthConfig;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Token class, carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived credential carrying the role claim
    Access,
    /// Long-lived credential used only to mint a new pair
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT Claims structure
///
/// The subject is the customer's primary phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - primary phone number
    pub sub: String,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: u64,
    /// Token class
    #[serde(rename = "type")]
    pub token_type: TokenKind,
    /// Role label, always present on access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    /// Strict expiry check against a single clock reading
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp < now
    }
}

/// JWT token encoding and decoding errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Expected {expected} token, got {actual}")]
    WrongTokenType {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Token lifetime of {lifetime_secs}s overflows issue time {issued_at}")]
    LifetimeOverflow { issued_at: u64, lifetime_secs: u64 },

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

impl JwtError {
    /// Whether the token was well-formed and correctly signed but past expiry
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::ExpiredToken)
    }
}

/// Current Unix time in seconds
pub fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Signs and verifies tokens of a single class
#[derive(Clone)]
pub struct TokenCodec {
    kind: TokenKind,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_secs: u64,
    issuer: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("kind", &self.kind)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec for one token class
    pub fn new(kind: TokenKind, secret: &[u8], lifetime_secs: u64, issuer: impl Into<String>) -> Self {
        Self {
            kind,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime_secs,
            issuer: issuer.into(),
        }
    }

    /// Access token codec from configuration
    pub fn access(config: &AuthConfig) -> Self {
        Self::new(
            TokenKind::Access,
            config.access_secret.as_bytes(),
            config.access_expiration_secs,
            config.issuer.clone(),
        )
    }

    /// Refresh token codec from configuration
    pub fn refresh(config: &AuthConfig) -> Self {
        Self::new(
            TokenKind::Refresh,
            config.refresh_secret.as_bytes(),
            config.refresh_expiration_secs,
            config.issuer.clone(),
        )
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Build and sign a token issued at `now`
    ///
    /// # Arguments
    ///
    /// * `subject` - Primary phone number
    /// * `role` - Role label (required for access tokens by convention)
    /// * `now` - Issue instant in Unix seconds
    pub fn encode_at(&self, subject: &str, role: Option<&str>, now: u64) -> Result<String, JwtError> {
        let exp = now
            .checked_add(self.lifetime_secs)
            .ok_or(JwtError::LifetimeOverflow {
                issued_at: now,
                lifetime_secs: self.lifetime_secs,
            })?;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp,
            token_type: self.kind,
            role: role.map(str::to_string),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(token)
    }

    /// Verify a token and extract its claims
    ///
    /// Signature, issuer and token class are checked by this codec; expiry is
    /// compared against the supplied `now` instead of a fresh clock read.
    ///
    /// # Returns
    ///
    /// * `Ok(Claims)` - Decoded and validated claims
    /// * `Err(JwtError)` - Malformed, wrongly signed, wrong class, or expired
    pub fn decode_at(&self, token: &str, now: u64) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken,
            }
        })?;

        let claims = token_data.claims;

        if claims.token_type != self.kind {
            return Err(JwtError::WrongTokenType {
                expected: self.kind,
                actual: claims.token_type,
            });
        }

        if claims.is_expired_at(now) {
            return Err(JwtError::ExpiredToken);
        }

        Ok(claims)
    }

    /// Verify a token against the system clock
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode_at(token, now_secs()?)
    }
}
