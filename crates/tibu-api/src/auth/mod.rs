//! Authentication and authorization module
//!
//! This module provides session-backed JWT authentication with the following
//! components:
//! - Signing key loading (HS256 shared secret or RS256 key pair)
//! - Access and refresh token issuance and verification
//! - Password hashing with Argon2
//! - Repository layer for users, sessions and pre-registered users
//! - Authentication service for account and session management
//! - Per-operation authorization gate and its HTTP middleware

pub mod gate;
pub mod jwt;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;

pub use gate::{default_policy, AccessPolicy, AuthGate, CurrentUser, Operation, RequestContext};
pub use jwt::{Claims, TokenError, TokenKind, TokenService};
pub use keys::{KeyError, KeyMaterial};
pub use middleware::{require_operation, OperationGuard};
pub use models::{
    AuthPayload, ChangeRoleRequest, LoginRequest, PreRegisterRequest, PreRegisteredUserInfo,
    RefreshRequest, SignUpRequest, UserInfo,
};
pub use password::{CredentialHasher, PasswordError};
pub use repository::{Repositories, RepositoryError};
pub use service::{AuthError, AuthService, TokenPair};
