//! Application state management

use std::sync::Arc;
use std::time::Instant;

use tibu_core::AppConfig;

use crate::auth::gate::{default_policy, AccessPolicy, AuthGate};
use crate::auth::jwt::TokenService;
use crate::auth::keys::KeyMaterial;
use crate::auth::password::CredentialHasher;
use crate::auth::repository::Repositories;
use crate::auth::service::AuthService;
use crate::operations::Operations;

/// Application state shared across handlers
///
/// Everything inside is immutable after startup or internally shared, so
/// cloning per request is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub operations: Operations,
    pub repositories: Repositories,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services together with the default access policy
    pub fn new(config: AppConfig, repositories: Repositories, keys: KeyMaterial) -> Self {
        Self::with_policy(config, repositories, keys, default_policy())
    }

    pub fn with_policy(
        config: AppConfig,
        repositories: Repositories,
        keys: KeyMaterial,
        policy: AccessPolicy,
    ) -> Self {
        let tokens = TokenService::from_config(keys, &config.auth);
        let hasher = CredentialHasher::new(
            config.auth.password.clone(),
            config.auth.min_password_length,
        );
        let service = AuthService::new(repositories.clone(), tokens, hasher);
        let gate = AuthGate::new(policy, service.clone());
        let operations = Operations::new(service, gate, config.environment.is_development());

        Self {
            config: Arc::new(config),
            operations,
            repositories,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
