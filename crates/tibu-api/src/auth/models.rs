//! Request and response models for the account API
//!
//! Entities from `tibu-core` are never returned directly; [`UserInfo`] is the
//! public projection of a user and has no password hash field at all.

use serde::{Deserialize, Serialize};
use tibu_core::{PreRegisteredUser, User};
use utoipa::ToSchema;
use validator::Validate;

use super::service::TokenPair;

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignUpRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

/// Body of the refresh and revoke endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Role change request; the role is matched case-insensitively
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    #[schema(example = "ADMIN")]
    pub role: String,
}

/// Invite-list entry request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PreRegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
}

/// Result of a login or registration
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthPayload {
    pub user: UserInfo,
    pub tokens: TokenPair,
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[schema(example = "USER")]
    pub role: String,
    /// Seconds since epoch
    pub created_at: i64,
    /// Seconds since epoch
    pub updated_at: i64,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

/// Public view of an invite-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PreRegisteredUserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<PreRegisteredUser> for PreRegisteredUserInfo {
    fn from(entry: PreRegisteredUser) -> Self {
        Self {
            id: entry.id,
            email: entry.email,
            name: entry.name,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tibu_core::Role;

    #[test]
    fn test_user_info_has_no_password_hash() {
        let user = User {
            id: 3,
            email: "ana@x.com".to_string(),
            name: "Ana".to_string(),
            password_hash: "$argon2id$v=19$...".to_string(),
            role: Role::Admin,
            created_at: 1,
            updated_at: 2,
        };

        let info = UserInfo::from(&user);
        assert_eq!(info.role, "ADMIN");

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn test_sign_up_validation() {
        let valid = SignUpRequest {
            name: "Ana".to_string(),
            email: "ana@x.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = SignUpRequest {
            email: "not-an-email".to_string(),
            ..valid.clone()
        };
        assert!(bad_email.validate().is_err());

        let empty_name = SignUpRequest {
            name: String::new(),
            ..valid
        };
        assert!(empty_name.validate().is_err());
    }

    #[test]
    fn test_pre_register_validation() {
        let request = PreRegisterRequest {
            email: "bo@".to_string(),
            name: "Bo".to_string(),
        };
        assert!(request.validate().is_err());
    }
}
