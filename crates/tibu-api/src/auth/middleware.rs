//! HTTP glue for the authorization gate
//!
//! [`require_operation`] runs the gate for one operation as route middleware
//! and stores the enriched [`RequestContext`] in the request extensions.
//! Handlers extract `RequestContext` directly; when the middleware already ran
//! they receive its context, so the operation surface's own gate check is a
//! role comparison only.
//!
//! # Usage
//!
//! ```ignore
//! use axum::{middleware, routing::get, Router};
//!
//! let app = Router::new().route(
//!     "/users",
//!     get(users::list_users_handler).route_layer(middleware::from_fn_with_state(
//!         OperationGuard::new(state.clone(), Operation::ListUsers),
//!         require_operation,
//!     )),
//! );
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

use super::gate::{Operation, RequestContext};
use crate::audit::ClientInfo;
use crate::error::AppError;
use crate::state::AppState;

/// Build a context from the `Authorization` header and client headers
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    RequestContext::from_authorization(authorization, ClientInfo::from_headers(headers))
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| context_from_headers(&parts.headers)))
    }
}

/// Middleware state: which operation a route serves
#[derive(Clone)]
pub struct OperationGuard {
    state: AppState,
    operation: Operation,
}

impl OperationGuard {
    pub fn new(state: AppState, operation: Operation) -> Self {
        Self { state, operation }
    }
}

/// Reject the request before the handler runs if the gate says no
pub async fn require_operation(
    State(guard): State<OperationGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut ctx = context_from_headers(request.headers());

    guard
        .state
        .operations
        .authorize(guard.operation, &mut ctx)?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
