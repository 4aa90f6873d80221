//! API handlers
//!
//! Handlers only pull the [`RequestContext`](crate::auth::gate::RequestContext)
//! and body out of the request and call into
//! [`Operations`](crate::operations::Operations).

pub mod auth;
pub mod health;
pub mod users;
