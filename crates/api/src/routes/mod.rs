pub mod commitments;
pub mod connection;
pub mod credits;
pub mod health;
pub mod webhook;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook", post(webhook::receive_webhook))
        .route("/check-connection", get(connection::check_connection))
        .route("/disconnect", post(connection::disconnect))
        .route("/sync-status", get(connection::sync_status))
        .route("/commitments/:id/complete", patch(commitments::complete))
        .route("/commitments/:id", delete(commitments::delete))
        .route("/commitments/completed", get(commitments::list_completed))
        .route("/commitments/deleted", get(commitments::list_deleted))
        .route("/commitments/restore/:id", post(commitments::restore))
        .route("/credits/status", get(credits::status))
        .with_state(state)
}
