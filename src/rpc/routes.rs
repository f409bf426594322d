//! REST API route definitions.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use super::handlers::{actions, devices, stash};
use super::state::AppState;

/// Build the API router with all REST endpoints.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Action routes
        .route(
            "/actions",
            get(actions::search_actions).post(actions::do_action),
        )
        .route("/actions/{id}", post(actions::update_action))
        // Device routes
        .route("/devices", get(devices::list_devices))
        .route("/devices/register", post(devices::register_device))
        // Stash routes; captures are routinely larger than the default limit
        .route(
            "/stash",
            put(stash::put_blob).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/stash/{key}",
            get(stash::get_blob).head(stash::head_blob),
        )
}
