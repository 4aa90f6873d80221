//! API route definitions

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put, MethodRouter},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::gate::Operation;
use crate::auth::middleware::{require_operation, OperationGuard};
use crate::handlers::{auth, health, users};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        auth::login_handler,
        auth::logout_handler,
        auth::refresh_handler,
        auth::revoke_handler,
        auth::signup_handler,
        users::me_handler,
        users::list_users_handler,
        users::get_user_handler,
        users::change_role_handler,
        users::list_pre_registered_handler,
        users::add_pre_registered_handler,
    ),
    components(schemas(
        crate::error::ApiError,
        crate::auth::models::LoginRequest,
        crate::auth::models::SignUpRequest,
        crate::auth::models::RefreshRequest,
        crate::auth::models::ChangeRoleRequest,
        crate::auth::models::PreRegisterRequest,
        crate::auth::models::AuthPayload,
        crate::auth::models::UserInfo,
        crate::auth::models::PreRegisteredUserInfo,
        crate::auth::service::TokenPair,
        auth::MessageResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sessions and tokens"),
        (name = "users", description = "Accounts and roles"),
        (name = "health", description = "Probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Run the gate for `operation` before the handler sees the request
fn guarded(
    state: &AppState,
    operation: Operation,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        OperationGuard::new(state.clone(), operation),
        require_operation,
    ))
}

/// Create API v1 routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    // Open operations; the handlers still pass through the gate
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/revoke", post(auth::revoke_handler))
        .route("/auth/signup", post(auth::signup_handler));

    let protected_routes = Router::new()
        .route(
            "/auth/logout",
            guarded(state, Operation::LogOut, post(auth::logout_handler)),
        )
        .route(
            "/users/me",
            guarded(state, Operation::CurrentUser, get(users::me_handler)),
        )
        .route(
            "/users",
            guarded(state, Operation::ListUsers, get(users::list_users_handler)),
        )
        .route(
            "/users/:id",
            guarded(state, Operation::GetUser, get(users::get_user_handler)),
        )
        .route(
            "/users/:id/role",
            guarded(state, Operation::ChangeUserRole, put(users::change_role_handler)),
        )
        .route(
            "/pre-registered-users",
            guarded(
                state,
                Operation::ListPreRegisteredUsers,
                get(users::list_pre_registered_handler),
            ),
        )
        .route(
            "/pre-registered-users",
            guarded(
                state,
                Operation::AddPreRegisteredUser,
                post(users::add_pre_registered_handler),
            ),
        );

    Router::new().merge(public_routes).merge(protected_routes)
}

/// CORS for the configured origins; none are allowed by default
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assemble the full application router
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes(&state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
