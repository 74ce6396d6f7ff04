//! Auth PIN hashing and verification using Argon2id
//!
//! Customer PINs are short, so they are only ever stored as salted
//! Argon2id hashes in PHC string format:
//! - Memory: 19 MB
//! - Iterations: 2
//! - Parallelism: 1
//! - Salt: 16 bytes random

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use thiserror::Error;

/// Longest PIN accepted at registration or login
pub const MAX_PIN_LEN: usize = 64;

/// PIN hashing and verification errors
#[derive(Debug, Error)]
pub enum PinError {
    #[error("Failed to hash PIN: {0}")]
    HashingFailed(String),

    #[error("Failed to verify PIN: {0}")]
    VerificationFailed(String),

    #[error("Invalid PIN hash format")]
    InvalidHashFormat,
}

/// Argon2 cost parameters for PIN hashing
#[derive(Debug, Clone)]
pub struct PinHashConfig {
    /// Memory cost in KB (default: 19456 = 19 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 2)
    pub time_cost: u32,
    /// Parallelism (threads, default: 1)
    pub parallelism: u32,
}

impl Default for PinHashConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PinHashConfig {
    fn to_params(&self) -> Result<Params, PinError> {
        Params::new(self.memory_cost, self.time_cost, self.parallelism, Some(32))
            .map_err(|e| PinError::HashingFailed(e.to_string()))
    }
}

/// Hash a plaintext PIN with the default cost parameters
pub fn hash_pin(pin: &str) -> Result<String, PinError> {
    hash_pin_with_config(pin, &PinHashConfig::default())
}

/// Hash a PIN with custom configuration
pub fn hash_pin_with_config(pin: &str, config: &PinHashConfig) -> Result<String, PinError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        config.to_params()?,
    );

    let hash = argon2
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| PinError::HashingFailed(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a plaintext PIN against a stored hash
///
/// # Returns
///
/// * `Ok(true)` - PIN matches
/// * `Ok(false)` - PIN does not match
/// * `Err(PinError)` - The stored hash is unreadable
pub fn verify_pin(pin: &str, hash: &str) -> Result<bool, PinError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PinError::InvalidHashFormat)?;

    // Parameters are read from the PHC string
    match Argon2::default().verify_password(pin.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PinError::VerificationFailed(e.to_string())),
    }
}

/// Check a PIN supplied at registration
pub fn validate_pin(pin: &str) -> Result<(), String> {
    if pin.is_empty() {
        return Err("Auth PIN is required".to_string());
    }
    if pin.len() > MAX_PIN_LEN {
        return Err(format!("Auth PIN must be at most {MAX_PIN_LEN} characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> PinHashConfig {
        PinHashConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify_pin() {
        let hash = hash_pin("1234").expect("Failed to hash PIN");

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_pin("1234", &hash).unwrap());
        assert!(!verify_pin("4321", &hash).unwrap());
    }

    #[test]
    fn test_same_pin_produces_different_hashes() {
        let hash1 = hash_pin_with_config("0000", &light()).unwrap();
        let hash2 = hash_pin_with_config("0000", &light()).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_pin("0000", &hash1).unwrap());
        assert!(verify_pin("0000", &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_pin("1234", "not-a-phc-string");
        assert!(matches!(result, Err(PinError::InvalidHashFormat)));
    }

    #[test]
    fn test_custom_config_is_encoded() {
        let hash = hash_pin_with_config("5678", &light()).unwrap();
        assert!(hash.contains("m=8192"));
        assert!(hash.contains("t=1"));
        assert!(verify_pin("5678", &hash).unwrap());
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("1234").is_ok());
        assert_eq!(validate_pin("").unwrap_err(), "Auth PIN is required");
        assert!(validate_pin(&"9".repeat(MAX_PIN_LEN + 1)).is_err());
    }
}
