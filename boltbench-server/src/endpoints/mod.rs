//! Contains all HTTP endpoint handlers.
//!
//! Use [`routes`] to create a router with all endpoints.

use axum::Router;

use crate::state::ServiceState;

mod autoheal;
pub mod common;
pub mod health;
mod ops;
mod perf;
mod validate;

/// Creates a router with the function endpoints and the health check.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(health::router())
        .merge(ops::router())
        .merge(validate::router())
        .merge(perf::router())
        .merge(autoheal::router())
}
