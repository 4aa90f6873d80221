//! PostgreSQL repositories
//!
//! Timestamps are stored as `BIGINT` seconds since the epoch and defaulted
//! by the database (see `migrations/`).

use async_trait::async_trait;
use sqlx::PgPool;
use tibu_core::{
    NewPreRegisteredUser, NewUser, PreRegisteredUser, Role, Session, User, UserFilter, UserUpdate,
};

use super::{PreRegisteredUserRepository, RepositoryError, SessionRepository, UserRepository};

const USER_COLUMNS: &str = "id, email, name, password_hash, role, created_at, updated_at";

/// Database row for users
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: tibu_core::InvalidRole| RepositoryError::InvalidData(e.to_string()))?;

        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PreRegisteredUserRow {
    id: i64,
    email: String,
    name: String,
    created_at: i64,
    updated_at: i64,
}

impl From<PreRegisteredUserRow> for PreRegisteredUser {
    fn from(row: PreRegisteredUserRow) -> Self {
        PreRegisteredUser {
            id: row.id,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// User repository over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        User::try_from(row)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                role = COALESCE($3, role), \
                updated_at = EXTRACT(EPOCH FROM now())::BIGINT \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE ($1::TEXT IS NULL OR email = $1)",
        )
        .bind(filter.email.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Session repository over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, user_id: i64) -> Result<Session, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "INSERT INTO sessions (user_id) VALUES ($1) \
             RETURNING id, user_id, created_at, updated_at",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, created_at, updated_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn delete_by_id(&self, id: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Invite-list repository over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgPreRegisteredUserRepository {
    pool: PgPool,
}

impl PgPreRegisteredUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreRegisteredUserRepository for PgPreRegisteredUserRepository {
    async fn create(
        &self,
        entry: NewPreRegisteredUser,
    ) -> Result<PreRegisteredUser, RepositoryError> {
        let row = sqlx::query_as::<_, PreRegisteredUserRow>(
            "INSERT INTO pre_registered_users (email, name) VALUES ($1, $2) \
             RETURNING id, email, name, created_at, updated_at",
        )
        .bind(&entry.email)
        .bind(&entry.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<PreRegisteredUser>, RepositoryError> {
        let rows = sqlx::query_as::<_, PreRegisteredUserRow>(
            "SELECT id, email, name, created_at, updated_at FROM pre_registered_users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PreRegisteredUser::from).collect())
    }
}
