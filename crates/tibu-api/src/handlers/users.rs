//! User and invite-list handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::auth::gate::RequestContext;
use crate::auth::models::{
    ChangeRoleRequest, PreRegisterRequest, PreRegisteredUserInfo, UserInfo,
};
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller's own record
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
) -> Result<Json<UserInfo>, AppError> {
    Ok(Json(state.operations.current_user(&mut ctx).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = Vec<UserInfo>),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Requires ADMIN", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
) -> Result<Json<Vec<UserInfo>>, AppError> {
    Ok(Json(state.operations.list_users(&mut ctx).await?))
}

/// Read a user by id
///
/// Callers may read themselves; reading anyone else requires `ADMIN`.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Not allowed to read this user", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<UserInfo>, AppError> {
    Ok(Json(state.operations.get_user(&mut ctx, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/role",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserInfo),
        (status = 400, description = "Unknown role", body = crate::error::ApiError),
        (status = 403, description = "Requires ADMIN", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_role_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(id): Path<i64>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<Json<UserInfo>, AppError> {
    Ok(Json(
        state.operations.change_user_role(&mut ctx, id, request).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/pre-registered-users",
    tag = "users",
    responses(
        (status = 200, description = "Invite list", body = Vec<PreRegisteredUserInfo>),
        (status = 403, description = "Requires ADMIN", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_pre_registered_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
) -> Result<Json<Vec<PreRegisteredUserInfo>>, AppError> {
    Ok(Json(
        state.operations.list_pre_registered_users(&mut ctx).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/pre-registered-users",
    tag = "users",
    request_body = PreRegisterRequest,
    responses(
        (status = 201, description = "Entry added", body = PreRegisteredUserInfo),
        (status = 400, description = "Invalid input or email already listed", body = crate::error::ApiError),
        (status = 403, description = "Requires ADMIN", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_pre_registered_handler(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<PreRegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .operations
        .add_pre_registered_user(&mut ctx, request)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
