use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Caller media transport (websocket upgrade)
        .route("/ws", get(ws::call_socket))
        // Session queries
        .route(
            "/sessions/:session_id/status",
            get(handlers::session_status),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::session_transcript),
        )
        // Call-lifecycle disconnect signal from the signaling layer
        .route(
            "/sessions/:session_id/disconnect",
            post(handlers::disconnect_session),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
