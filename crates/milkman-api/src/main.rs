//! Milkman API Server
//!
//! Configuration comes from `MILKMAN_CONFIG` (a TOML file) when set, with
//! environment variables taking precedence, or from the environment alone.

use anyhow::Context;
use milkman_api::{create_router, routes, state::AppState};
use milkman_core::{AppConfig, CustomerStore, LoggingConfig, MemoryCustomerStore, PgCustomerStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("MILKMAN_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("milkman_api={},tower_http=debug,audit=info", logging.level).into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CustomerStore>> {
    match &config.database.url {
        Some(url) => {
            let store = PgCustomerStore::new(url, config.database.pool_size)
                .await
                .context("failed to connect to PostgreSQL")?;
            store.ensure_schema().await?;
            tracing::info!("Using PostgreSQL customer store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, customers are kept in memory");
            Ok(Arc::new(MemoryCustomerStore::new()))
        }
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    // Fail readiness while in-flight requests drain
    state.set_ready(false);
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let addr = config.server.bind_addr();
    let customers = open_store(&config).await?;

    let state = Arc::new(AppState::new(config, customers, routes::access_policy())?);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Milkman API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}{}", addr, routes::paths::OPENAPI);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
