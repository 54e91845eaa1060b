//! # Web API Module
//!
//! Axum REST API for user management. Handlers call [`UserService`], which
//! feeds the event queue; event propagation never affects a response.
//!
//! [`UserService`]: crate::users::UserService

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Build the application router with request tracing
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .nest(routes::API_V1, routes::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
