//! Bestflow notification server: pull API, push fan-out and event intake.

use axum::{
    routing::{get, patch, post},
    Router,
};
use bestflow_shared::NOTIFICATIONS_WS_PATH;

pub mod auth;
pub mod config;
pub mod hub;
pub mod problem;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod ws;

pub use config::ServerConfig;
pub use state::AppState;

/// Build the application router. Middleware layers are added by the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Notifications
        .route("/api/v1/notifications", get(routes::notifications::list_notifications))
        .route("/api/v1/notifications/unread-count", get(routes::notifications::unread_count))
        .route("/api/v1/notifications/read-all", patch(routes::notifications::mark_all_read))
        .route("/api/v1/notifications/{id}/read", patch(routes::notifications::mark_read))
        .route("/api/v1/notifications/events", post(routes::notifications::ingest_event))
        // WebSocket
        .route(NOTIFICATIONS_WS_PATH, get(ws::ws_handler))
        .with_state(state)
}
