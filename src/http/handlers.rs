use super::state::AppState;
use crate::store::SessionRecord;
use crate::transcript::TranscriptSegment;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    #[serde(flatten)]
    pub record: SessionRecord,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /sessions/:session_id/status
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.relay.store.fetch_session(&session_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(SessionStatusResponse { record })).into_response(),
        Ok(None) => not_found(&session_id),
        Err(e) => {
            error!("failed to fetch session: {e:#}");
            internal_error(e)
        }
    }
}

/// GET /sessions/:session_id/transcript
/// Ordered transcript segments persisted so far
pub async fn session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.relay.store.fetch_session(&session_id).await {
        Ok(Some(_)) => match state.relay.store.fetch_segments(&session_id).await {
            Ok(segments) => {
                (StatusCode::OK, Json::<Vec<TranscriptSegment>>(segments)).into_response()
            }
            Err(e) => {
                error!("failed to fetch transcript: {e:#}");
                internal_error(e)
            }
        },
        Ok(None) => not_found(&session_id),
        Err(e) => internal_error(e),
    }
}

/// POST /sessions/:session_id/disconnect
/// Explicit call-terminated signal; finalizes the session without waiting
/// for the transport-close grace period.
pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id).await {
        Some(handle) => {
            info!(session = %session_id, "disconnect signal received");
            handle.disconnect().await;
            (
                StatusCode::OK,
                Json(DisconnectResponse {
                    session_id,
                    status: "disconnecting".to_string(),
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {session_id} not found"),
        }),
    )
        .into_response()
}

fn internal_error(e: anyhow::Error) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{e:#}"),
        }),
    )
        .into_response()
}
