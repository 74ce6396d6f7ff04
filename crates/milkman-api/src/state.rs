//! Application state management

use crate::auth::{AccessPolicy, AuthService, TokenService};
use milkman_core::{AppConfig, ConfigError, CustomerStore, MemoryCustomerStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers and the auth interceptor
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Token issuance and validation
    pub tokens: Arc<TokenService>,
    /// Customer identity store
    pub customers: Arc<dyn CustomerStore>,
    /// Registration, login and refresh flows
    pub auth: AuthService,
    /// Route role requirements
    pub policy: Arc<AccessPolicy>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Create state from validated configuration and a customer store
    ///
    /// Fails when the token secrets do not pass validation.
    pub fn new(
        config: AppConfig,
        customers: Arc<dyn CustomerStore>,
        policy: AccessPolicy,
    ) -> Result<Self, ConfigError> {
        let tokens = Arc::new(TokenService::new(&config.auth, customers.clone())?);
        let auth = AuthService::new(tokens.clone(), customers.clone());

        Ok(Self {
            config,
            tokens,
            customers,
            auth,
            policy: Arc::new(policy),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        })
    }

    /// State backed by the in-memory customer store
    pub fn in_memory(config: AppConfig, policy: AccessPolicy) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(MemoryCustomerStore::new()), policy)
    }

    /// Replace the authentication service (e.g. to tune PIN hashing cost)
    pub fn with_auth_service(mut self, auth: AuthService) -> Self {
        self.auth = auth;
        self
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
