//! Tibu Core - Domain models and shared configuration
//!
//! This crate defines the plain data entities used throughout the accounts service:
//! - Users, sessions and pre-registered (invited) users
//! - The role enumeration and its normalization rules
//! - Input records for repository writes
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig,
    PasswordConfig, ServerConfig, SigningAlgorithm,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Roles
// ============================================================================

/// Access level of a user account
///
/// Serialized in uppercase (`USER`, `ADMIN`), matching the value carried in
/// the `role` claim of access tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Raised when a role string is not one of the enumerated values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid role: {0}")]
pub struct InvalidRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Whether a caller holding `claimed` satisfies a requirement of `self`.
    ///
    /// A `USER` requirement is met by any authenticated caller; an `ADMIN`
    /// requirement only by a claim that is exactly `ADMIN`.
    pub fn is_satisfied_by(&self, claimed: Option<&str>) -> bool {
        match self {
            Role::User => true,
            Role::Admin => claimed == Some(Role::Admin.as_str()),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = InvalidRole;

    /// Input is uppercased first and only then checked against the enum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(InvalidRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// User account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Argon2id PHC string; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    /// Seconds since epoch
    pub created_at: i64,
    /// Seconds since epoch
    pub updated_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Server-side record anchoring a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Carried as the `jti` claim of both tokens of a pair
    pub id: i64,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Invite-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreRegisteredUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Repository inputs
// ============================================================================

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update of a user; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
}

/// Filter for counting users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Exact-match email filter
    pub email: Option<String>,
}

impl UserFilter {
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
        }
    }
}

/// Fields required to insert an invite-list entry
#[derive(Debug, Clone)]
pub struct NewPreRegisteredUser {
    pub email: String,
    pub name: String,
}

/// Current time in whole seconds since the Unix epoch
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_role_parse_normalizes_case() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("USER".parse::<Role>(), Ok(Role::User));
        assert_eq!(
            "superuser".parse::<Role>(),
            Err(InvalidRole("superuser".to_string()))
        );
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_default_is_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_role_requirement() {
        assert!(Role::User.is_satisfied_by(Some("USER")));
        assert!(Role::User.is_satisfied_by(Some("ADMIN")));
        assert!(Role::User.is_satisfied_by(None));
        assert!(Role::Admin.is_satisfied_by(Some("ADMIN")));
        assert!(!Role::Admin.is_satisfied_by(Some("admin")));
        assert!(!Role::Admin.is_satisfied_by(Some("USER")));
        assert!(!Role::Admin.is_satisfied_by(None));
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let user = User {
            id: 1,
            email: "ana@x.com".to_string(),
            name: "Ana".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::User,
            created_at: 10,
            updated_at: 10,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"role\":\"USER\""));
    }

    proptest! {
        #[test]
        fn prop_any_casing_of_a_known_role_parses(mask in proptest::collection::vec(any::<bool>(), 5)) {
            let input: String = "admin"
                .chars()
                .zip(mask.iter())
                .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
                .collect();
            prop_assert_eq!(input.parse::<Role>(), Ok(Role::Admin));
        }

        #[test]
        fn prop_unknown_roles_are_rejected(input in "[a-z]{1,12}") {
            prop_assume!(input != "user" && input != "admin");
            prop_assert!(input.parse::<Role>().is_err());
        }
    }
}
