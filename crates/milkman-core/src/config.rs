//! Milkman Configuration Management
//!
//! Handles configuration from environment variables and TOML files.
//! Signing secrets have no defaults: they must be supplied at startup and
//! are checked by [`AppConfig::validate`] before the token service is built.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum HMAC secret length in bytes (256 bits for HS256)
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime (one year)
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Customer store connection
    pub database: DatabaseConfig,

    /// Token signing configuration
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = parse_var("API_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(size) = std::env::var("DATABASE_POOL_SIZE") {
            self.database.pool_size = parse_var("DATABASE_POOL_SIZE", size)?;
        }

        // Token signing
        if let Ok(secret) = std::env::var("JWT_ACCESS_SECRET") {
            self.auth.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("JWT_REFRESH_SECRET") {
            self.auth.refresh_secret = secret;
        }
        if let Ok(secs) = std::env::var("JWT_ACCESS_EXPIRATION_SECS") {
            self.auth.access_expiration_secs = parse_var("JWT_ACCESS_EXPIRATION_SECS", secs)?;
        }
        if let Ok(secs) = std::env::var("JWT_REFRESH_EXPIRATION_SECS") {
            self.auth.refresh_expiration_secs = parse_var("JWT_REFRESH_EXPIRATION_SECS", secs)?;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_var("LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Check the configuration before it is handed to the services
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Customer store configuration
///
/// Without a URL the server keeps customers in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

/// Token signing configuration
///
/// Access and refresh tokens are signed with independent secrets.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,

    /// HMAC secret for refresh tokens
    pub refresh_secret: String,

    /// Access token lifetime in seconds (default: 30 minutes)
    pub access_expiration_secs: u64,

    /// Refresh token lifetime in seconds (default: 7 days)
    pub refresh_expiration_secs: u64,

    /// Token issuer identifier
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_expiration_secs: 30 * 60,
            refresh_expiration_secs: 7 * 24 * 60 * 60,
            issuer: "milkman-api".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_expiration_secs", &self.access_expiration_secs)
            .field("refresh_expiration_secs", &self.refresh_expiration_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl AuthConfig {
    /// Verify both secrets are present, long enough, and distinct
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_secret("JWT_ACCESS_SECRET", &self.access_secret)?;
        check_secret("JWT_REFRESH_SECRET", &self.refresh_secret)?;

        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::InvalidValue {
                key: "JWT_REFRESH_SECRET".to_string(),
                value: "<must differ from JWT_ACCESS_SECRET>".to_string(),
            });
        }

        check_lifetime("JWT_ACCESS_EXPIRATION_SECS", self.access_expiration_secs)?;
        check_lifetime("JWT_REFRESH_EXPIRATION_SECS", self.refresh_expiration_secs)?;

        Ok(())
    }
}

fn check_lifetime(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TOKEN_LIFETIME_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("{secs} (must be 1..={MAX_TOKEN_LIFETIME_SECS})"),
        });
    }
    Ok(())
}

fn check_secret(key: &str, secret: &str) -> Result<(), ConfigError> {
    if secret.is_empty() {
        return Err(ConfigError::MissingRequired(key.to_string()));
    }
    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("<{} bytes, need at least {MIN_SECRET_LEN}>", secret.len()),
        });
    }
    Ok(())
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_auth() -> AuthConfig {
        AuthConfig {
            access_secret: "a".repeat(MIN_SECRET_LEN),
            refresh_secret: "r".repeat(MIN_SECRET_LEN),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.access_expiration_secs, 1800);
        assert_eq!(config.auth.refresh_expiration_secs, 604_800);
        assert_eq!(config.auth.issuer, "milkman-api");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_default_config_has_no_secrets() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(key)) if key == "JWT_ACCESS_SECRET"
        ));
    }

    #[test]
    fn test_valid_auth_config() {
        assert!(valid_auth().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let auth = AuthConfig {
            refresh_secret: "too-short".to_string(),
            ..valid_auth()
        };
        let err = auth.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JWT_REFRESH_SECRET"));
        // The secret itself never ends up in the message
        assert!(!err.to_string().contains("too-short"));
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let secret = "s".repeat(MIN_SECRET_LEN);
        let auth = AuthConfig {
            access_secret: secret.clone(),
            refresh_secret: secret,
            ..Default::default()
        };
        assert!(auth.validate().is_err());
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let auth = AuthConfig {
            access_expiration_secs: 0,
            ..valid_auth()
        };
        assert!(auth.validate().is_err());
    }

    #[test]
    fn test_oversized_lifetime_rejected() {
        let auth = AuthConfig {
            refresh_expiration_secs: u64::MAX,
            ..valid_auth()
        };
        assert!(matches!(
            auth.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "JWT_REFRESH_EXPIRATION_SECS"
        ));

        let at_cap = AuthConfig {
            access_expiration_secs: MAX_TOKEN_LIFETIME_SECS,
            ..valid_auth()
        };
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid_auth());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&"a".repeat(MIN_SECRET_LEN)));
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
            [server]
            port = 9090

            [auth]
            access_secret = "0123456789abcdef0123456789abcdef"
            refresh_secret = "fedcba9876543210fedcba9876543210"
            access_expiration_secs = 600
        "#;

        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.access_expiration_secs, 600);
        assert_eq!(config.auth.refresh_expiration_secs, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file("/nonexistent/milkman.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError { .. })));
    }

    #[test]
    fn test_parse_var_invalid() {
        let result: Result<u16, _> = parse_var("API_PORT", "not-a-port".to_string());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
