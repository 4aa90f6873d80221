//! Role-based authorization gate
//!
//! Every caller-visible operation is named by [`Operation`]. An
//! [`AccessPolicy`] maps operations to the minimum [`Role`] they require,
//! either per operation kind (all queries, all mutations) or per operation;
//! the per-operation entry wins. [`AuthGate::authorize`] is the single place
//! the policy is enforced.
//!
//! Authorizing a [`RequestContext`] that already carries verified claims only
//! repeats the role comparison, so the HTTP middleware and the operation
//! surface can both run the gate without verifying the token twice.

use std::collections::HashMap;
use std::sync::Arc;
use tibu_core::{Role, User};
use tokio::sync::OnceCell;

use super::jwt::{Claims, TokenKind};
use super::service::{AuthError, AuthService};
use crate::audit::{audit_log, AuditEvent, ClientInfo};

/// Query or mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// Caller-visible operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LogIn,
    LogOut,
    RefreshAccessToken,
    RevokeRefreshToken,
    SignUp,
    AddPreRegisteredUser,
    ChangeUserRole,
    CurrentUser,
    GetUser,
    ListUsers,
    ListPreRegisteredUsers,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::LogIn,
        Operation::LogOut,
        Operation::RefreshAccessToken,
        Operation::RevokeRefreshToken,
        Operation::SignUp,
        Operation::AddPreRegisteredUser,
        Operation::ChangeUserRole,
        Operation::CurrentUser,
        Operation::GetUser,
        Operation::ListUsers,
        Operation::ListPreRegisteredUsers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::LogIn => "logIn",
            Operation::LogOut => "logOut",
            Operation::RefreshAccessToken => "refreshAccessToken",
            Operation::RevokeRefreshToken => "revokeRefreshToken",
            Operation::SignUp => "signUp",
            Operation::AddPreRegisteredUser => "addPreRegisteredUser",
            Operation::ChangeUserRole => "changeUserRole",
            Operation::CurrentUser => "currentUser",
            Operation::GetUser => "getUser",
            Operation::ListUsers => "listUsers",
            Operation::ListPreRegisteredUsers => "listPreRegisteredUsers",
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CurrentUser
            | Operation::GetUser
            | Operation::ListUsers
            | Operation::ListPreRegisteredUsers => OperationKind::Query,
            _ => OperationKind::Mutation,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Required roles, declared as data
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    kinds: HashMap<OperationKind, Role>,
    /// `None` explicitly opens an operation inside a protected kind
    operations: HashMap<Operation, Option<Role>>,
}

impl AccessPolicy {
    /// A policy with no requirements at all
    pub fn open() -> Self {
        Self::default()
    }

    /// Require `role` for every operation of `kind`; replaces any earlier entry
    pub fn require_kind(mut self, kind: OperationKind, role: Role) -> Self {
        self.kinds.insert(kind, role);
        self
    }

    /// Require `role` for `operation`; replaces any earlier entry
    pub fn require(mut self, operation: Operation, role: Role) -> Self {
        self.operations.insert(operation, Some(role));
        self
    }

    /// Let anyone call `operation`, whatever its kind requires
    pub fn allow(mut self, operation: Operation) -> Self {
        self.operations.insert(operation, None);
        self
    }

    pub fn requirement(&self, operation: Operation) -> Option<Role> {
        match self.operations.get(&operation) {
            Some(explicit) => *explicit,
            None => self.kinds.get(&operation.kind()).copied(),
        }
    }
}

/// The service's own policy: queries need a signed-in caller, account
/// administration needs `ADMIN`, token endpoints are open.
pub fn default_policy() -> AccessPolicy {
    AccessPolicy::open()
        .require_kind(OperationKind::Query, Role::User)
        .require(Operation::ListUsers, Role::Admin)
        .require(Operation::ListPreRegisteredUsers, Role::Admin)
        .require(Operation::LogOut, Role::User)
        .require(Operation::AddPreRegisteredUser, Role::Admin)
        .require(Operation::ChangeUserRole, Role::Admin)
}

/// Lazily resolved, memoized record of the authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser {
    user_id: i64,
    service: AuthService,
    cell: Arc<OnceCell<User>>,
}

impl CurrentUser {
    fn new(user_id: i64, service: AuthService) -> Self {
        Self {
            user_id,
            service,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn id(&self) -> i64 {
        self.user_id
    }

    /// Load the user on first use; later calls return the cached record
    pub async fn get(&self) -> Result<&User, AuthError> {
        self.cell
            .get_or_try_init(|| self.service.get_user(self.user_id))
            .await
    }
}

/// Per-request state the gate reads and enriches
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: Option<String>,
    client: ClientInfo,
    claims: Option<Arc<Claims>>,
    current_user: Option<CurrentUser>,
}

impl RequestContext {
    pub fn new(token: Option<String>, client: ClientInfo) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            client,
            claims: None,
            current_user: None,
        }
    }

    /// Build from a raw `Authorization` header value
    ///
    /// A `Bearer ` prefix is stripped; without it the whole value is taken
    /// as the token.
    pub fn from_authorization(header: Option<&str>, client: ClientInfo) -> Self {
        let token = header
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
            .map(str::to_string);
        Self::new(token, client)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// Verified access-token claims, once the gate has run
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_deref()
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.current_user.as_ref()
    }

    /// Claims of an authenticated caller, or `Unauthenticated`
    pub fn require_claims(&self) -> Result<&Claims, AuthError> {
        self.claims().ok_or(AuthError::Unauthenticated)
    }

    pub fn require_current_user(&self) -> Result<&CurrentUser, AuthError> {
        self.current_user().ok_or(AuthError::Unauthenticated)
    }
}

/// Enforces an [`AccessPolicy`]
#[derive(Debug, Clone)]
pub struct AuthGate {
    policy: Arc<AccessPolicy>,
    service: AuthService,
}

impl AuthGate {
    pub fn new(policy: AccessPolicy, service: AuthService) -> Self {
        Self {
            policy: Arc::new(policy),
            service,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide whether `operation` may run with `ctx`
    ///
    /// On success the context carries the caller's claims and a
    /// [`CurrentUser`] accessor. Failures are `Unauthenticated` (no token, or
    /// a token that does not verify as an access token) or `Forbidden`
    /// (verified, but the role is insufficient).
    pub fn authorize(
        &self,
        operation: Operation,
        ctx: &mut RequestContext,
    ) -> Result<(), AuthError> {
        let Some(required) = self.policy.requirement(operation) else {
            return Ok(());
        };

        let (claims, user_id) = match &ctx.claims {
            Some(claims) => (claims.clone(), None),
            None => {
                let (claims, user_id) = self.verify(operation, ctx)?;
                (Arc::new(claims), Some(user_id))
            }
        };

        if !required.is_satisfied_by(claims.role.as_deref()) {
            audit_log(&AuditEvent::AccessDenied {
                user_id: claims.user_id().ok(),
                operation: operation.name().to_string(),
                required_role: required.as_str().to_string(),
                client: ctx.client.clone(),
            });
            return Err(AuthError::Forbidden);
        }

        if let Some(user_id) = user_id {
            ctx.current_user = Some(CurrentUser::new(user_id, self.service.clone()));
            ctx.claims = Some(claims);
        }

        Ok(())
    }

    fn verify(
        &self,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<(Claims, i64), AuthError> {
        let token = ctx.bearer_token().ok_or(AuthError::Unauthenticated)?;

        let verified = self
            .service
            .verify_token(token, TokenKind::Access)
            .and_then(|claims| Ok((claims.user_id()?, claims)));

        match verified {
            Ok((user_id, claims)) => Ok((claims, user_id)),
            Err(e) => {
                tracing::debug!(operation = %operation, error = %e, "Token rejected");
                audit_log(&AuditEvent::InvalidToken {
                    operation: operation.name().to_string(),
                    reason: e.to_string(),
                    client: ctx.client.clone(),
                });
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
