//! Milkman CLI - operator tasks
//!
//! Usage:
//!   milkman token issue --subject <phone> --role <role> [--refresh]
//!   milkman token inspect <token> [--refresh]
//!   milkman config check [--file <path>]
//!
//! Signing secrets are read through the same loader as the server:
//! `--config` / `MILKMAN_CONFIG` for a TOML file, then environment overrides.

use anyhow::Context;
use clap::{Parser, Subcommand};
use milkman_api::auth::{TokenCodec, TokenKind};
use milkman_core::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "milkman")]
#[command(about = "Milkman authentication operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $MILKMAN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue or inspect tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Configuration tasks
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Mint a signed token
    Issue {
        /// Primary phone number
        #[arg(long)]
        subject: String,
        /// Role label
        #[arg(long)]
        role: String,
        /// Mint a refresh token instead of an access token
        #[arg(long)]
        refresh: bool,
    },
    /// Verify a token and print its claims
    Inspect {
        token: String,
        /// Verify with the refresh codec
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate configuration
    Check {
        /// TOML file to check (overrides --config)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn load_config(file: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let file = file.or_else(|| std::env::var_os("MILKMAN_CONFIG").map(PathBuf::from));
    let config = match file {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn codec(config: &AppConfig, refresh: bool) -> TokenCodec {
    if refresh {
        TokenCodec::refresh(&config.auth)
    } else {
        TokenCodec::access(&config.auth)
    }
}

fn issue(config: &AppConfig, subject: &str, role: &str, refresh: bool) -> anyhow::Result<String> {
    let codec = codec(config, refresh);
    let now = milkman_api::auth::jwt::now_secs()?;
    let token = codec.encode_at(subject, Some(role), now)?;
    tracing::debug!(kind = %codec.kind(), %subject, "Issued token");
    Ok(token)
}

fn inspect(config: &AppConfig, token: &str, refresh: bool) -> anyhow::Result<String> {
    let codec = codec(config, refresh);
    let kind = codec.kind();
    let claims = codec
        .decode(token)
        .with_context(|| format!("{kind} token rejected"))?;
    Ok(serde_json::to_string_pretty(&claims)?)
}

fn check(config: &AppConfig) -> String {
    let auth = &config.auth;
    format!(
        "configuration OK\n  listen: {}\n  store: {}\n  access lifetime: {}s\n  refresh lifetime: {}s\n  issuer: {}",
        config.server.bind_addr(),
        if config.database.url.is_some() { "postgres" } else { "memory" },
        auth.access_expiration_secs,
        auth.refresh_expiration_secs,
        auth.issuer,
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Token { action } => {
            let config = load_config(cli.config)?;
            match action {
                TokenAction::Issue { subject, role, refresh } => {
                    println!("{}", issue(&config, &subject, &role, refresh)?);
                }
                TokenAction::Inspect { token, refresh } => {
                    println!("{}", inspect(&config, &token, refresh)?);
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Check { file } => {
                let config = load_config(file.or(cli.config))?;
                println!("{}", check(&config));
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.access_secret = "cli-access-secret-0123456789abcdefghij".to_string();
        config.auth.refresh_secret = "cli-refresh-secret-0123456789abcdefghij".to_string();
        config
    }

    #[test]
    fn test_parse_token_issue() {
        let cli = Cli::try_parse_from([
            "milkman", "token", "issue", "--subject", "9876543210", "--role", "ADMIN",
        ])
        .unwrap();

        match cli.command {
            Commands::Token {
                action: TokenAction::Issue { subject, role, refresh },
            } => {
                assert_eq!(subject, "9876543210");
                assert_eq!(role, "ADMIN");
                assert!(!refresh);
            }
            _ => panic!("expected token issue"),
        }
    }

    #[test]
    fn test_parse_requires_role() {
        assert!(Cli::try_parse_from(["milkman", "token", "issue", "--subject", "1"]).is_err());
    }

    #[test]
    fn test_issue_then_inspect() {
        let config = test_config();
        let token = issue(&config, "9876543210", "CUSTOMER", false).unwrap();

        let printed = inspect(&config, &token, false).unwrap();
        let claims: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(claims["sub"], "9876543210");
        assert_eq!(claims["role"], "CUSTOMER");
        assert_eq!(claims["type"], "access");
    }

    #[test]
    fn test_inspect_with_wrong_class_fails() {
        let config = test_config();
        let refresh = issue(&config, "9876543210", "CUSTOMER", true).unwrap();

        assert!(inspect(&config, &refresh, false).is_err());
        assert!(inspect(&config, &refresh, true).is_ok());
    }

    #[test]
    fn test_check_summary() {
        let summary = check(&test_config());
        assert!(summary.contains("store: memory"));
        assert!(summary.contains("access lifetime: 1800s"));
        assert!(!summary.contains("cli-access-secret"));
    }
}
