//! # Web API Route Definitions

use axum::routing::get;
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

pub const API_V1: &str = "/api/v1";

/// Routes mounted under [`API_V1`]
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
}
