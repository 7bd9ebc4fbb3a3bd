//! Caller-side websocket: the telephony media stream for one call.
//!
//! Each connection becomes one session. The upstream backend connection is
//! established first; if that fails the socket is closed immediately rather
//! than leaving the caller in a half-open call. Inbound frames that do not
//! parse are transport noise and are dropped without closing anything.

use super::state::AppState;
use crate::relay::{CallFrame, CallSession, SessionEvent, SessionHandle};
use crate::transport::{BackendHandle, CallEnvelope, InboundCallFrame};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Opaque caller identity forwarded by the signaling layer
    #[serde(rename = "callerId")]
    pub caller_id: Option<String>,
}

/// GET /ws: upgrade the caller media transport
pub async fn call_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_call(socket, params, state))
}

async fn handle_call(mut socket: WebSocket, params: ConnectParams, state: AppState) {
    let session_id = format!("call-{}", uuid::Uuid::new_v4());
    let caller_identity = params.caller_id.unwrap_or_else(|| "unknown".to_string());

    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(256);

    // Upstream first: a caller connection without a backend is useless
    let backend = match BackendHandle::connect(&state.relay.config.backend, events_tx.clone()).await
    {
        Ok(backend) => backend,
        Err(e) => {
            error!(session = %session_id, "upstream connect failed, closing caller socket: {e:#}");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "upstream unavailable".into(),
                })))
                .await;
            return;
        }
    };

    let (caller_tx, mut caller_rx) = mpsc::channel::<CallFrame>(64);
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound leg: session frames → JSON envelope → socket
    let writer = tokio::spawn(async move {
        while let Some(frame) = caller_rx.recv().await {
            let envelope = match frame {
                CallFrame::Audio(bytes) => CallEnvelope::audio(&bytes),
                CallFrame::StopAudio => CallEnvelope::stop_audio(),
            };
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to serialize caller frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        debug!("caller writer exiting");
    });

    let session_task = CallSession::spawn(
        session_id.clone(),
        caller_identity,
        state.relay.clone(),
        events_rx,
        caller_tx,
        backend.commands(),
    );

    state
        .registry
        .insert(SessionHandle::new(session_id.clone(), events_tx.clone()))
        .await;
    info!(session = %session_id, "caller connected");

    // Inbound leg: socket → decoded frames → session
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match CallEnvelope::decode(&text) {
                Some(InboundCallFrame::Audio(bytes)) => {
                    if events_tx.send(SessionEvent::CallerAudio(bytes)).await.is_err() {
                        break;
                    }
                }
                Some(InboundCallFrame::StopAudio) => {
                    if events_tx.send(SessionEvent::CallerAudioStop).await.is_err() {
                        break;
                    }
                }
                None => debug!(session = %session_id, "ignoring malformed caller frame"),
            },
            Ok(Message::Binary(_)) => {
                debug!(session = %session_id, "ignoring binary caller frame")
            }
            Ok(Message::Close(_)) => {
                info!(session = %session_id, "caller disconnected");
                break;
            }
            Ok(_) => {} // ping/pong
            Err(e) => {
                warn!(session = %session_id, "caller socket error: {}", e);
                break;
            }
        }
    }

    // Transport-level close; the session finalizes now or after the grace
    // period, whichever signal lands first
    let _ = events_tx.send(SessionEvent::CallClosed).await;
    drop(events_tx);

    if let Err(e) = session_task.await {
        error!(session = %session_id, "session task panicked: {}", e);
    }

    state.registry.remove(&session_id).await;
    backend.shutdown().await;
    writer.abort();
    info!(session = %session_id, "caller transport torn down");
}
