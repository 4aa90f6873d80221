//! Caller-visible operations
//!
//! Each operation runs the [`AuthGate`] first, so nothing past this point
//! executes for a caller who fails authorization, and then translates domain
//! errors into [`AppError`]s. Transports (the HTTP handlers, the tests) only
//! build a [`RequestContext`] and call in here.

use tibu_core::Role;
use validator::Validate;

use crate::audit::{audit_log, AuditEvent};
use crate::auth::gate::{AuthGate, Operation, RequestContext};
use crate::auth::jwt::TokenKind;
use crate::auth::models::{
    AuthPayload, ChangeRoleRequest, LoginRequest, PreRegisterRequest, PreRegisteredUserInfo,
    SignUpRequest, UserInfo,
};
use crate::auth::service::{AuthError, AuthService, TokenPair};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Operations {
    service: AuthService,
    gate: AuthGate,
    expose_details: bool,
}

impl Operations {
    pub fn new(service: AuthService, gate: AuthGate, expose_details: bool) -> Self {
        Self {
            service,
            gate,
            expose_details,
        }
    }

    pub fn service(&self) -> &AuthService {
        &self.service
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn error(&self, err: AuthError) -> AppError {
        AppError::from_auth(err, self.expose_details)
    }

    /// Run the gate for `operation`
    pub fn authorize(
        &self,
        operation: Operation,
        ctx: &mut RequestContext,
    ) -> Result<(), AppError> {
        self.gate
            .authorize(operation, ctx)
            .map_err(|e| self.error(e))
    }

    pub async fn log_in(
        &self,
        ctx: &mut RequestContext,
        request: LoginRequest,
    ) -> Result<AuthPayload, AppError> {
        self.authorize(Operation::LogIn, ctx)?;

        let user = match self.service.authenticate(&request.email, &request.password).await {
            Ok(user) => user,
            Err(e) => {
                audit_log(&AuditEvent::LoginFailure {
                    email: request.email,
                    reason: e.to_string(),
                    client: ctx.client().clone(),
                });
                return Err(self.error(e));
            }
        };

        let tokens = self
            .service
            .furnish_tokens(&user)
            .await
            .map_err(|e| self.error(e))?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email.clone(),
            client: ctx.client().clone(),
        });

        Ok(AuthPayload {
            user: UserInfo::from(&user),
            tokens,
        })
    }

    /// End the session the caller's access token belongs to
    ///
    /// Succeeds when the session is already gone, so repeating a logout with
    /// the same access token is harmless.
    pub async fn log_out(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        self.authorize(Operation::LogOut, ctx)?;

        let (user_id, session_id) = {
            let claims = ctx.require_claims().map_err(|e| self.error(e))?;
            let user_id = claims.user_id().map_err(|e| self.error(e.into()))?;
            let session_id = claims.session_id().map_err(|e| self.error(e.into()))?;
            (user_id, session_id)
        };

        match self.service.revoke_session(session_id).await {
            Ok(()) => {}
            Err(AuthError::SessionNotFound) => {
                tracing::debug!(user_id, session_id, "Logout for a session already revoked");
                return Ok(());
            }
            Err(e) => return Err(self.error(e)),
        }

        audit_log(&AuditEvent::Logout {
            user_id,
            session_id,
            client: ctx.client().clone(),
        });
        Ok(())
    }

    pub async fn refresh_access_token(
        &self,
        ctx: &mut RequestContext,
        refresh_token: &str,
    ) -> Result<TokenPair, AppError> {
        self.authorize(Operation::RefreshAccessToken, ctx)?;

        let pair = self
            .service
            .refresh_access_token(refresh_token)
            .await
            .map_err(|e| self.error(e))?;

        if let Some((user_id, session_id)) = self.token_identity(refresh_token) {
            audit_log(&AuditEvent::TokenRefresh {
                user_id,
                session_id,
                client: ctx.client().clone(),
            });
        }
        Ok(pair)
    }

    pub async fn revoke_refresh_token(
        &self,
        ctx: &mut RequestContext,
        refresh_token: &str,
    ) -> Result<(), AppError> {
        self.authorize(Operation::RevokeRefreshToken, ctx)?;

        self.service
            .revoke_refresh_token(refresh_token)
            .await
            .map_err(|e| self.error(e))?;

        if let Some((_, session_id)) = self.token_identity(refresh_token) {
            audit_log(&AuditEvent::TokenRevoked {
                session_id,
                client: ctx.client().clone(),
            });
        }
        Ok(())
    }

    /// Register and immediately sign in
    pub async fn sign_up(
        &self,
        ctx: &mut RequestContext,
        request: SignUpRequest,
    ) -> Result<AuthPayload, AppError> {
        self.authorize(Operation::SignUp, ctx)?;
        request.validate()?;

        let user = match self
            .service
            .register(&request.name, &request.email, &request.password)
            .await
        {
            Ok(user) => user,
            Err(e) => {
                audit_log(&AuditEvent::RegistrationFailure {
                    email: request.email,
                    reason: e.to_string(),
                    client: ctx.client().clone(),
                });
                return Err(self.error(e));
            }
        };

        let tokens = self
            .service
            .furnish_tokens(&user)
            .await
            .map_err(|e| self.error(e))?;

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            client: ctx.client().clone(),
        });

        Ok(AuthPayload {
            user: UserInfo::from(&user),
            tokens,
        })
    }

    pub async fn add_pre_registered_user(
        &self,
        ctx: &mut RequestContext,
        request: PreRegisterRequest,
    ) -> Result<PreRegisteredUserInfo, AppError> {
        self.authorize(Operation::AddPreRegisteredUser, ctx)?;
        request.validate()?;

        let entry = self
            .service
            .add_pre_registered_user(&request.email, &request.name)
            .await
            .map_err(|e| self.error(e))?;

        audit_log(&AuditEvent::PreRegisteredUserAdded {
            email: entry.email.clone(),
            added_by: ctx.current_user().map(|current| current.id()),
            client: ctx.client().clone(),
        });
        Ok(entry.into())
    }

    pub async fn change_user_role(
        &self,
        ctx: &mut RequestContext,
        user_id: i64,
        request: ChangeRoleRequest,
    ) -> Result<UserInfo, AppError> {
        self.authorize(Operation::ChangeUserRole, ctx)?;

        let user = self
            .service
            .change_user_role(user_id, &request.role)
            .await
            .map_err(|e| self.error(e))?;

        audit_log(&AuditEvent::RoleChanged {
            user_id: user.id,
            role: user.role.as_str().to_string(),
            changed_by: ctx.current_user().map(|current| current.id()),
            client: ctx.client().clone(),
        });
        Ok(user.into())
    }

    pub async fn current_user(&self, ctx: &mut RequestContext) -> Result<UserInfo, AppError> {
        self.authorize(Operation::CurrentUser, ctx)?;

        let current = ctx.require_current_user().map_err(|e| self.error(e))?;
        let user = current.get().await.map_err(|e| self.error(e))?;
        Ok(UserInfo::from(user))
    }

    /// Read a user record
    ///
    /// Callers may read their own record; anyone else's requires `ADMIN`.
    pub async fn get_user(
        &self,
        ctx: &mut RequestContext,
        user_id: i64,
    ) -> Result<UserInfo, AppError> {
        self.authorize(Operation::GetUser, ctx)?;

        let caller_id = self.caller_id(ctx)?;
        let is_admin = ctx
            .claims()
            .is_some_and(|claims| Role::Admin.is_satisfied_by(claims.role.as_deref()));

        if caller_id != user_id && !is_admin {
            audit_log(&AuditEvent::AccessDenied {
                user_id: Some(caller_id),
                operation: Operation::GetUser.name().to_string(),
                required_role: Role::Admin.as_str().to_string(),
                client: ctx.client().clone(),
            });
            return Err(self.error(AuthError::Forbidden));
        }

        let user = self
            .service
            .get_user(user_id)
            .await
            .map_err(|e| self.error(e))?;
        Ok(user.into())
    }

    pub async fn list_users(&self, ctx: &mut RequestContext) -> Result<Vec<UserInfo>, AppError> {
        self.authorize(Operation::ListUsers, ctx)?;

        let users = self.service.list_users().await.map_err(|e| self.error(e))?;
        Ok(users.into_iter().map(UserInfo::from).collect())
    }

    pub async fn list_pre_registered_users(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<Vec<PreRegisteredUserInfo>, AppError> {
        self.authorize(Operation::ListPreRegisteredUsers, ctx)?;

        let entries = self
            .service
            .list_pre_registered_users()
            .await
            .map_err(|e| self.error(e))?;
        Ok(entries.into_iter().map(PreRegisteredUserInfo::from).collect())
    }

    fn caller_id(&self, ctx: &RequestContext) -> Result<i64, AppError> {
        ctx.require_current_user()
            .map(|current| current.id())
            .map_err(|e| self.error(e))
    }

    /// User and session ids of an already accepted refresh token
    fn token_identity(&self, refresh_token: &str) -> Option<(i64, i64)> {
        let claims = self
            .service
            .verify_token(refresh_token, TokenKind::Refresh)
            .ok()?;
        Some((claims.user_id().ok()?, claims.session_id().ok()?))
    }
}
