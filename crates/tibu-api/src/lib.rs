//! Tibu API - account and session server
//!
//! Email/password accounts, session-backed JWT access and refresh tokens,
//! and a role gate in front of every operation, served over HTTP with axum.

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod operations;
pub mod routes;
pub mod state;

use axum::Router;

pub use state::AppState;

/// Build the application router for the given state
pub fn create_router(state: AppState) -> Router {
    routes::app_router(state)
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! In-memory wiring for tests

    use super::*;
    use crate::auth::keys::KeyMaterial;
    use crate::auth::repository::Repositories;
    use tibu_core::{AppConfig, Environment, PasswordConfig};

    pub const TEST_SECRET: &[u8] = b"tibu-test-signing-secret";

    /// Configuration for tests: lightest hashing cost, test environment
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig {
            environment: Environment::Test,
            ..AppConfig::default()
        };
        config.auth.password = PasswordConfig::minimum();
        config
    }

    /// State over fresh in-memory repositories
    pub fn test_state() -> AppState {
        let keys = KeyMaterial::from_secret(TEST_SECRET)
            .unwrap_or_else(|_| KeyMaterial::development_placeholder());
        AppState::new(test_config(), Repositories::in_memory(), keys)
    }
}

/// Router over in-memory repositories for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(testing::test_state())
}
