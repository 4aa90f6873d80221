//! API error handling
//!
//! Domain errors become an [`AppError`], which renders as
//! `{"code": ..., "message": ..., "details": ...}`. Caller mistakes keep their
//! message; unexpected failures are logged and collapse into a single
//! `INTERNAL_SERVER_ERROR`, with details only when running in development.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthError;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_SERVER_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Validation and business-rule failures (400)
    BadUserInput(String),
    /// Wrong email or password (401)
    InvalidCredentials,
    /// Missing, invalid or revoked credentials (401)
    Unauthenticated(String),
    Forbidden,
    NotFound(String),
    /// Anything unexpected; `details` only set in development
    Internal { details: Option<String> },
}

impl AppError {
    /// Translate a domain error
    ///
    /// `expose_details` controls whether internal error text reaches the
    /// caller; it is always logged.
    pub fn from_auth(err: AuthError, expose_details: bool) -> Self {
        match err {
            AuthError::InvalidCredentialFormat(_)
            | AuthError::DuplicateEmail
            | AuthError::InvalidRole(_) => AppError::BadUserInput(err.to_string()),
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::Unauthenticated
            | AuthError::TokenExpired
            | AuthError::TokenMalformed(_)
            | AuthError::TokenSignatureInvalid
            | AuthError::TokenMissingSubject
            | AuthError::InvalidToken
            | AuthError::SessionNotFound => AppError::Unauthenticated(err.to_string()),
            AuthError::Forbidden => AppError::Forbidden,
            AuthError::UserNotFound => AppError::NotFound("User".to_string()),
            AuthError::SessionCreationFailed(_)
            | AuthError::Repository(_)
            | AuthError::Internal(_) => {
                tracing::error!(error = %err, "Request failed");
                AppError::Internal {
                    details: expose_details.then(|| err.to_string()),
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadUserInput(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_USER_INPUT", msg))
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_CREDENTIALS", "Invalid email or password"),
            ),
            AppError::Unauthenticated(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHENTICATED", msg))
            }
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                ApiError::new("FORBIDDEN", "Access denied"),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ApiError::new("NOT_FOUND", format!("{resource} not found")),
            ),
            AppError::Internal { details } => {
                let error = match details {
                    Some(details) => ApiError::internal_error().with_details(details),
                    None => ApiError::internal_error(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, error)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadUserInput(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::RepositoryError;

    #[test]
    fn test_caller_errors_keep_their_message() {
        let err = AppError::from_auth(AuthError::DuplicateEmail, false);
        assert!(matches!(err, AppError::BadUserInput(ref m) if m.contains("already registered")));

        let err = AppError::from_auth(AuthError::InvalidRole("ROOT".to_string()), false);
        assert!(matches!(err, AppError::BadUserInput(_)));
    }

    #[test]
    fn test_token_errors_are_unauthenticated() {
        for err in [
            AuthError::TokenExpired,
            AuthError::TokenSignatureInvalid,
            AuthError::TokenMissingSubject,
            AuthError::InvalidToken,
            AuthError::SessionNotFound,
        ] {
            assert!(matches!(
                AppError::from_auth(err, false),
                AppError::Unauthenticated(_)
            ));
        }
    }

    #[test]
    fn test_internal_details_are_masked_outside_development() {
        let masked = AppError::from_auth(
            AuthError::Repository(RepositoryError::Database("connection refused".to_string())),
            false,
        );
        assert!(matches!(masked, AppError::Internal { details: None }));

        let exposed = AppError::from_auth(
            AuthError::Repository(RepositoryError::Database("connection refused".to_string())),
            true,
        );
        assert!(
            matches!(exposed, AppError::Internal { details: Some(ref d) } if d.contains("connection refused"))
        );
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::BadUserInput("x".to_string()), StatusCode::BAD_REQUEST),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::Unauthenticated("x".to_string()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::NotFound("User".to_string()), StatusCode::NOT_FOUND),
            (
                AppError::Internal { details: None },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
