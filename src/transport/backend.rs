//! Speech-backend websocket client.
//!
//! Owns the upstream connection for one session: a writer task drains the
//! command channel into the socket, a reader task converts wire messages to
//! domain events and feeds them into the session's event channel. A connect
//! failure here is fatal to session establishment; everything after that is
//! best-effort.

use crate::config::BackendConfig;
use crate::relay::{BackendCommand, BackendEvent, SessionEvent};
use crate::transcript::{Speaker, TranscriptSegment};
use crate::transport::protocol::{ClientMessage, ServerMessage, SessionParams};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live connection to the speech backend for one session
pub struct BackendHandle {
    commands: mpsc::Sender<BackendCommand>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl BackendHandle {
    /// Connect, configure the session and prompt the opening response.
    /// Retries the websocket handshake with exponential backoff before
    /// giving up.
    pub async fn connect(
        config: &BackendConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self> {
        let ws = connect_with_retry(&config.url, config.connect_attempts).await?;
        let (mut sink, stream) = ws.split();

        send_wire(
            &mut sink,
            &ClientMessage::SessionUpdate {
                session: SessionParams::server_vad(),
            },
        )
        .await?;
        send_wire(&mut sink, &ClientMessage::ResponseCreate).await?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let writer = tokio::spawn(write_loop(sink, command_rx));
        let reader = tokio::spawn(read_loop(stream, events));

        Ok(Self {
            commands: command_tx,
            writer,
            reader,
        })
    }

    pub fn commands(&self) -> mpsc::Sender<BackendCommand> {
        self.commands.clone()
    }

    /// Close the connection and reap the transport tasks.
    pub async fn shutdown(self) {
        self.reader.abort();
        drop(self.commands);
        let _ = self.writer.await;
    }
}

async fn connect_with_retry(url: &str, attempts: u32) -> Result<WsStream> {
    let mut last_error = None;

    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
            info!(
                "retrying backend connection in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                attempts
            );
            tokio::time::sleep(delay).await;
        }

        match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
            Ok(Ok((ws, _response))) => {
                info!("connected to speech backend");
                return Ok(ws);
            }
            Ok(Err(e)) => {
                warn!("backend connection attempt {} failed: {}", attempt + 1, e);
                last_error = Some(anyhow::Error::from(e));
            }
            Err(_) => {
                warn!("backend connection attempt {} timed out", attempt + 1);
                last_error = Some(anyhow::anyhow!("connection timed out"));
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no connection attempts made"))
        .context(format!("failed to connect to speech backend at {url}")))
}

async fn send_wire(
    sink: &mut SplitSink<WsStream, Message>,
    message: &ClientMessage,
) -> Result<()> {
    let json = serde_json::to_string(message).context("failed to serialize backend command")?;
    sink.send(Message::Text(json))
        .await
        .context("failed to send to speech backend")
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut commands: mpsc::Receiver<BackendCommand>,
) {
    while let Some(command) = commands.recv().await {
        let message = wire_from_command(command);
        if let Err(e) = send_wire(&mut sink, &message).await {
            // Best-effort path: the session keeps running without upstream
            warn!("backend send failed: {e:#}");
            break;
        }
    }
    let _ = sink.close().await;
    debug!("backend writer exiting");
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::Sender<SessionEvent>) {
    let failed = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    if let Some(event) = event_from_wire(message) {
                        if events.send(SessionEvent::Backend(event)).await.is_err() {
                            return; // session already gone
                        }
                    }
                }
                Err(_) => debug!("ignoring unparseable backend frame"),
            },
            Some(Ok(Message::Close(_))) | None => break false,
            Some(Ok(_)) => {} // ping/pong/binary
            Some(Err(e)) => {
                warn!("backend websocket error: {}", e);
                break true;
            }
        }
    };

    let _ = events.send(SessionEvent::BackendClosed { failed }).await;
    debug!("backend reader exiting");
}

fn wire_from_command(command: BackendCommand) -> ClientMessage {
    match command {
        BackendCommand::AppendAudio { bytes } => ClientMessage::audio_append(&bytes),
        BackendCommand::CommitInput => ClientMessage::AudioCommit,
        BackendCommand::CancelResponse { response_id } => {
            ClientMessage::ResponseCancel { response_id }
        }
        BackendCommand::ClearInputBuffer => ClientMessage::AudioClear,
    }
}

fn event_from_wire(message: ServerMessage) -> Option<BackendEvent> {
    match message {
        ServerMessage::SessionCreated { session } => Some(BackendEvent::SessionEstablished {
            session_id: session.id,
        }),
        ServerMessage::SessionUpdated => None,
        ServerMessage::Error { error } => {
            warn!(
                code = error.code.as_deref().unwrap_or("-"),
                "backend error: {}",
                error.message
            );
            None
        }
        ServerMessage::SpeechStarted { audio_start_ms } => {
            debug!(offset_ms = audio_start_ms, "caller speech activity started");
            Some(BackendEvent::SpeechActivityStarted)
        }
        ServerMessage::SpeechStopped { .. } => Some(BackendEvent::SpeechActivityStopped),
        ServerMessage::ResponseCreated { response } => Some(BackendEvent::ResponseStarted {
            response_id: response.id,
        }),
        ServerMessage::ResponseDone { .. } => Some(BackendEvent::ResponseCompleted),
        ServerMessage::AudioDelta { response_id, delta } => match STANDARD.decode(delta) {
            Ok(bytes) => Some(BackendEvent::AudioDelta { response_id, bytes }),
            Err(_) => {
                debug!("dropping audio delta with invalid encoding");
                None
            }
        },
        ServerMessage::InputTranscriptCompleted {
            transcript,
            start_ms,
            end_ms,
            confidence,
        } => Some(BackendEvent::Transcript(
            TranscriptSegment::new(
                Speaker::User,
                transcript,
                start_ms.unwrap_or(0),
                end_ms.unwrap_or(0),
            )
            .with_confidence(confidence),
        )),
        ServerMessage::ResponseTranscriptDone {
            transcript,
            start_ms,
            end_ms,
        } => Some(BackendEvent::Transcript(TranscriptSegment::new(
            Speaker::Assistant,
            transcript,
            start_ms.unwrap_or(0),
            end_ms.unwrap_or(0),
        ))),
        ServerMessage::Unknown => None,
    }
}
