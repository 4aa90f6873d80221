//! Persistence contracts for accounts, sessions and the invite list
//!
//! Business rules live in [`AuthService`](super::service::AuthService); the
//! repositories only store and fetch records. Uniqueness of email addresses
//! is enforced here, and a violation is reported as
//! [`RepositoryError::UniqueViolation`] so callers can tell it apart from an
//! outage.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tibu_core::{
    NewPreRegisteredUser, NewUser, PreRegisteredUser, Session, User, UserFilter, UserUpdate,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryStore;
pub use postgres::{PgPreRegisteredUserRepository, PgSessionRepository, PgUserRepository};

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return RepositoryError::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return RepositoryError::ForeignKeyViolation(constraint);
            }
        }
        RepositoryError::Database(err.to_string())
    }
}

/// User account storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    /// Exact-match lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Insert a user; a taken email yields [`RepositoryError::UniqueViolation`]
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Apply a partial update and refresh `updated_at`; `None` if no such user
    async fn update(&self, id: i64, update: UserUpdate) -> Result<Option<User>, RepositoryError>;

    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError>;

    async fn list(&self) -> Result<Vec<User>, RepositoryError>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Refresh-token session storage
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: i64) -> Result<Session, RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, RepositoryError>;

    /// Returns the number of deleted rows (0 or 1)
    async fn delete_by_id(&self, id: i64) -> Result<u64, RepositoryError>;
}

/// Invite-list storage
#[async_trait]
pub trait PreRegisteredUserRepository: Send + Sync {
    async fn create(
        &self,
        entry: NewPreRegisteredUser,
    ) -> Result<PreRegisteredUser, RepositoryError>;

    async fn list(&self) -> Result<Vec<PreRegisteredUser>, RepositoryError>;
}

/// The full set of repositories the service depends on
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub pre_registered_users: Arc<dyn PreRegisteredUserRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            pre_registered_users: Arc::new(PgPreRegisteredUserRepository::new(pool)),
        }
    }

    /// Repositories backed by one shared in-memory store
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryStore::new()))
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_store(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            pre_registered_users: store,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
