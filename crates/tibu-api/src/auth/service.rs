//! Authentication service layer
//!
//! Business rules for registration, credential checks and the token/session
//! lifecycle. A session moves `NONE -> ACTIVE` when a token pair is issued and
//! `ACTIVE -> REVOKED` (row deleted) on logout or revocation. Refreshing keeps
//! the session and reissues only the access token.
//!
//! Role requirements are not checked here; that is the gate's job.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tibu_core::{
    InvalidRole, NewPreRegisteredUser, NewUser, PreRegisteredUser, Role, User, UserFilter,
    UserUpdate,
};
use utoipa::ToSchema;

use super::jwt::{Claims, TokenError, TokenKind, TokenService};
use super::password::{CredentialHasher, PasswordError};
use super::repository::{Repositories, RepositoryError};

/// Authentication and authorization failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentialFormat(String),

    #[error("Email address is already registered")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Malformed token: {0}")]
    TokenMalformed(String),

    #[error("Invalid token signature")]
    TokenSignatureInvalid,

    #[error("Token has no subject")]
    TokenMissingSubject,

    #[error("Token does not belong to an active session")]
    InvalidToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Failed to create session: {0}")]
    SessionCreationFailed(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied")]
    Forbidden,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Malformed(msg) => AuthError::TokenMalformed(msg),
            TokenError::SignatureInvalid => AuthError::TokenSignatureInvalid,
            TokenError::MissingSubject => AuthError::TokenMissingSubject,
            TokenError::Encoding(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort { .. } => AuthError::InvalidCredentialFormat(err.to_string()),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<InvalidRole> for AuthError {
    fn from(err: InvalidRole) -> Self {
        AuthError::InvalidRole(err.0)
    }
}

/// Access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Authentication service
#[derive(Debug, Clone)]
pub struct AuthService {
    repositories: Repositories,
    tokens: Arc<TokenService>,
    hasher: CredentialHasher,
}

impl AuthService {
    pub fn new(repositories: Repositories, tokens: TokenService, hasher: CredentialHasher) -> Self {
        Self {
            repositories,
            tokens: Arc::new(tokens),
            hasher,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Register a new user with role `USER`
    ///
    /// The password policy is checked before the store is touched. The email
    /// pre-check gives a fast answer; the store's uniqueness constraint is the
    /// authority when two registrations race.
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - Newly created user; no tokens are issued
    /// * `Err(AuthError::InvalidCredentialFormat)` - Password too short
    /// * `Err(AuthError::DuplicateEmail)` - Email already registered
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        self.hasher.validate(password)?;

        let existing = self
            .repositories
            .users
            .count(&UserFilter::by_email(email))
            .await?;
        if existing > 0 {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash(password).await?;

        let user = self
            .repositories
            .users
            .create(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => AuthError::DuplicateEmail,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Check an email/password pair
    ///
    /// Unknown email and wrong password produce the same error, and both pay
    /// for one Argon2 verification.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.repositories.users.find_by_email(email).await? else {
            self.hasher.verify_dummy(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Open a new session for `user` and sign both tokens for it
    pub async fn furnish_tokens(&self, user: &User) -> Result<TokenPair, AuthError> {
        let session = self
            .repositories
            .sessions
            .create(user.id)
            .await
            .map_err(|e| AuthError::SessionCreationFailed(e.to_string()))?;

        let refresh_token = self.tokens.issue_refresh_token(user.id, session.id)?;
        let access_token = self.furnish_access_token(user, session.id)?;

        tracing::debug!(user_id = user.id, session_id = session.id, "Session opened");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Sign a fresh access token for an existing session
    ///
    /// The session store is not consulted.
    pub fn furnish_access_token(&self, user: &User, session_id: i64) -> Result<String, AuthError> {
        Ok(self.tokens.issue_access_token(user, session_id)?)
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The session named by the token must still exist and belong to the
    /// token's subject. The refresh token itself is returned unchanged.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.user_id()?;
        let session_id = claims.session_id()?;

        let session = self
            .repositories
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if session.user_id != user_id {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .repositories
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let access_token = self.furnish_access_token(&user, session_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Revoke the session behind a refresh token
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        self.revoke_session(claims.session_id()?).await
    }

    /// Delete a session by id
    pub async fn revoke_session(&self, session_id: i64) -> Result<(), AuthError> {
        let deleted = self.repositories.sessions.delete_by_id(session_id).await?;
        if deleted == 0 {
            return Err(AuthError::SessionNotFound);
        }

        tracing::debug!(session_id, "Session revoked");
        Ok(())
    }

    /// Verify a token of the given kind
    pub fn verify_token(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        Ok(self.tokens.verify(token, kind)?)
    }

    /// Resolve the user a token was issued to
    pub async fn get_user_from_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<User, AuthError> {
        let claims = self.verify_token(token, kind)?;
        self.get_user(claims.user_id()?).await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, AuthError> {
        self.repositories
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.repositories.users.list().await?)
    }

    /// Set a user's role
    ///
    /// `role` is uppercased and then checked against the known roles, so
    /// `"admin"` is accepted and `"superuser"` is not.
    pub async fn change_user_role(&self, user_id: i64, role: &str) -> Result<User, AuthError> {
        self.get_user(user_id).await?;
        let role: Role = role.parse()?;

        let user = self
            .repositories
            .users
            .update(
                user_id,
                UserUpdate {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        tracing::info!(user_id, role = %role, "User role changed");
        Ok(user)
    }

    /// Add an invite-list entry; a taken email is [`AuthError::DuplicateEmail`]
    pub async fn add_pre_registered_user(
        &self,
        email: &str,
        name: &str,
    ) -> Result<PreRegisteredUser, AuthError> {
        self.repositories
            .pre_registered_users
            .create(NewPreRegisteredUser {
                email: email.to_string(),
                name: name.to_string(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => AuthError::DuplicateEmail,
                other => AuthError::Repository(other),
            })
    }

    pub async fn list_pre_registered_users(&self) -> Result<Vec<PreRegisteredUser>, AuthError> {
        Ok(self.repositories.pre_registered_users.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::KeyMaterial;
    use crate::auth::repository::{InMemoryStore, UserRepository};
    use async_trait::async_trait;
    use tibu_core::PasswordConfig;

    fn token_service() -> TokenService {
        TokenService::new(
            KeyMaterial::from_secret(b"service-test-secret").unwrap(),
            "api.tibu.nu",
            "api.tibu.nu",
            3600,
        )
    }

    fn service_with(repositories: Repositories) -> AuthService {
        AuthService::new(
            repositories,
            token_service(),
            CredentialHasher::new(PasswordConfig::minimum(), 6),
        )
    }

    fn service() -> (AuthService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (service_with(Repositories::from_store(store.clone())), store)
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (service, _) = service();
        let registered = service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let user = service.authenticate("ana@x.com", "secret1").await.unwrap();

        assert_eq!(user.id, registered.id);
        assert_eq!(user.email, "ana@x.com");
        assert_eq!(user.name, "Ana");
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "secret1");
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (service, store) = service();
        service.register("Ana", "ana@x.com", "secret1").await.unwrap();

        let result = service.register("Ana 2", "ana@x.com", "secret2").await;
        assert!(matches!(result, Err(AuthError::DuplicateEmail)));
        assert_eq!(
            store.count(&UserFilter::by_email("ana@x.com")).await.unwrap(),
            1
        );
    }

    /// Delegates everything but always claims no user exists
    struct BlindCount(Arc<InMemoryStore>);

    #[async_trait]
    impl UserRepository for BlindCount {
        async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
            self.0.find_by_email(email).await
        }
        async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
            UserRepository::create(self.0.as_ref(), user).await
        }
        async fn update(
            &self,
            id: i64,
            update: UserUpdate,
        ) -> Result<Option<User>, RepositoryError> {
            self.0.update(id, update).await
        }
        async fn count(&self, _filter: &UserFilter) -> Result<i64, RepositoryError> {
            Ok(0)
        }
        async fn list(&self) -> Result<Vec<User>, RepositoryError> {
            UserRepository::list(self.0.as_ref()).await
        }
        async fn ping(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_detected_by_store_when_pre_check_misses() {
        let store = Arc::new(InMemoryStore::new());
        let mut repositories = Repositories::from_store(store.clone());
        repositories.users = Arc::new(BlindCount(store.clone()));
        let service = service_with(repositories);

        service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let result = service.register("Ana", "ana@x.com", "secret1").await;

        assert!(matches!(result, Err(AuthError::DuplicateEmail)));
        assert_eq!(
            store.count(&UserFilter::by_email("ana@x.com")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_short_password_fails_before_any_write() {
        let (service, store) = service();

        let result = service.register("Ana", "ana@x.com", "abc").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentialFormat(_))));
        assert_eq!(store.count(&UserFilter::default()).await.unwrap(), 0);

        // Policy is checked even when the email is taken
        service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let result = service.register("Ana", "ana@x.com", "abc").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentialFormat(_))));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_are_indistinguishable() {
        let (service, _) = service();
        service.register("Ana", "ana@x.com", "secret1").await.unwrap();

        let wrong_password = service.authenticate("ana@x.com", "secret2").await.unwrap_err();
        let unknown_email = service.authenticate("bo@x.com", "secret1").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_unknown_email_still_runs_a_verification() {
        let (service, _) = service();
        service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        assert_eq!(service.hasher.verification_count(), 0);

        service.authenticate("ana@x.com", "secret2").await.unwrap_err();
        assert_eq!(service.hasher.verification_count(), 1);

        service.authenticate("bo@x.com", "secret1").await.unwrap_err();
        assert_eq!(service.hasher.verification_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_reuses_session() {
        let (service, _) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let pair = service.furnish_tokens(&user).await.unwrap();

        let refreshed = service.refresh_access_token(&pair.refresh_token).await.unwrap();
        assert_eq!(refreshed.refresh_token, pair.refresh_token);

        let original = service.verify_token(&pair.access_token, TokenKind::Access).unwrap();
        let renewed = service
            .verify_token(&refreshed.access_token, TokenKind::Access)
            .unwrap();
        assert_eq!(original.jti, renewed.jti);
        assert_eq!(renewed.sub, user.id.to_string());

        // The refresh token stays usable
        assert!(service.refresh_access_token(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_each_token_pair_gets_its_own_session() {
        let (service, store) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();

        let first = service.furnish_tokens(&user).await.unwrap();
        let second = service.furnish_tokens(&user).await.unwrap();

        let first = service.verify_token(&first.refresh_token, TokenKind::Refresh).unwrap();
        let second = service.verify_token(&second.refresh_token, TokenKind::Refresh).unwrap();
        assert_ne!(first.jti, second.jti);
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_revoke_then_refresh_fails() {
        let (service, _) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let pair = service.furnish_tokens(&user).await.unwrap();

        service.revoke_refresh_token(&pair.refresh_token).await.unwrap();

        let refresh = service.refresh_access_token(&pair.refresh_token).await;
        assert!(matches!(refresh, Err(AuthError::InvalidToken)));

        let second_revoke = service.revoke_refresh_token(&pair.refresh_token).await;
        assert!(matches!(second_revoke, Err(AuthError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_orphaned_session_is_an_invalid_token() {
        let (service, store) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let pair = service.furnish_tokens(&user).await.unwrap();

        store.remove_user(user.id).await;

        let result = service.refresh_access_token(&pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_session_creation_failure() {
        let (service, _) = service();
        let ghost = User {
            id: 999,
            email: "ghost@x.com".to_string(),
            name: "Ghost".to_string(),
            password_hash: String::new(),
            role: Role::User,
            created_at: 0,
            updated_at: 0,
        };

        let result = service.furnish_tokens(&ghost).await;
        assert!(matches!(result, Err(AuthError::SessionCreationFailed(_))));
    }

    #[tokio::test]
    async fn test_get_user_from_token() {
        let (service, store) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();
        let pair = service.furnish_tokens(&user).await.unwrap();

        let from_access = service
            .get_user_from_token(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();
        let from_refresh = service
            .get_user_from_token(&pair.refresh_token, TokenKind::Refresh)
            .await
            .unwrap();
        assert_eq!(from_access.id, user.id);
        assert_eq!(from_refresh.id, user.id);

        let wrong_kind = service
            .get_user_from_token(&pair.refresh_token, TokenKind::Access)
            .await;
        assert!(matches!(wrong_kind, Err(AuthError::TokenMalformed(_))));

        store.remove_user(user.id).await;
        let gone = service
            .get_user_from_token(&pair.access_token, TokenKind::Access)
            .await;
        assert!(matches!(gone, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_change_user_role_normalizes_case() {
        let (service, _) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();

        let updated = service.change_user_role(user.id, "admin").await.unwrap();
        assert_eq!(updated.role, Role::Admin);

        // The next login carries the new role
        let user = service.authenticate("ana@x.com", "secret1").await.unwrap();
        let pair = service.furnish_tokens(&user).await.unwrap();
        let claims = service.verify_token(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.role.as_deref(), Some("ADMIN"));
    }

    #[tokio::test]
    async fn test_change_user_role_errors() {
        let (service, _) = service();
        let user = service.register("Ana", "ana@x.com", "secret1").await.unwrap();

        let invalid = service.change_user_role(user.id, "superuser").await;
        assert!(matches!(invalid, Err(AuthError::InvalidRole(ref r)) if r == "superuser"));

        let missing = service.change_user_role(999, "ADMIN").await;
        assert!(matches!(missing, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_pre_registered_users() {
        let (service, _) = service();
        service.add_pre_registered_user("bo@x.com", "Bo").await.unwrap();

        let duplicate = service.add_pre_registered_user("bo@x.com", "Bo").await;
        assert!(matches!(duplicate, Err(AuthError::DuplicateEmail)));

        let entries = service.list_pre_registered_users().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Bo");
    }
}
