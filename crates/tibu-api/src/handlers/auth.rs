//! Authentication API handlers
//!
//! Login, logout, token refresh and revocation, and sign-up.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::gate::RequestContext;
use crate::auth::models::{AuthPayload, LoginRequest, RefreshRequest, SignUpRequest};
use crate::auth::service::TokenPair;
use crate::error::AppError;
use crate::state::AppState;

/// Response of endpoints that only acknowledge
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Log in with email and password
///
/// Opens a new session and returns the user together with a token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthPayload),
        (status = 401, description = "Invalid email or password", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthPayload>, AppError> {
    let payload = state.operations.log_in(&mut ctx, request).await?;
    Ok(Json(payload))
}

/// End the session of the presented access token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
) -> Result<Json<MessageResponse>, AppError> {
    state.operations.log_out(&mut ctx).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Exchange a refresh token for a fresh token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = TokenPair),
        (status = 401, description = "Refresh token rejected", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let pair = state
        .operations
        .refresh_access_token(&mut ctx, &request.refresh_token)
        .await?;
    Ok(Json(pair))
}

/// Revoke the session behind a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/revoke",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Refresh token rejected", body = crate::error::ApiError),
    )
)]
pub async fn revoke_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .operations
        .revoke_refresh_token(&mut ctx, &request.refresh_token)
        .await?;
    Ok(Json(MessageResponse::new("Refresh token revoked")))
}

/// Register a new account and sign in
///
/// New accounts get the `USER` role. The password must be at least the
/// configured minimum length.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    tag = "auth",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = AuthPayload),
        (status = 400, description = "Invalid input or email already registered", body = crate::error::ApiError),
    )
)]
pub async fn signup_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<SignUpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = state.operations.sign_up(&mut ctx, request).await?;
    Ok((StatusCode::CREATED, Json(payload)))
}
