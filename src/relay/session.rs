use super::arbiter::InterruptionArbiter;
use super::event::{AudioChunk, AudioOrigin, BackendCommand, BackendEvent, CallFrame, SessionEvent};
use super::RelayContext;
use crate::recording::Recorder;
use crate::store::{SessionRecord, SessionStatus};
use crate::transcript::TranscriptBatcher;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One bridged call: the session owns all mutable state and processes every
/// event through a single channel, so no locking is needed and ordering
/// within the session is exactly arrival ordering. Independent sessions
/// share nothing mutable.
pub struct CallSession {
    id: String,
    caller_identity: String,
    ctx: RelayContext,
    events: mpsc::Receiver<SessionEvent>,
    caller: mpsc::Sender<CallFrame>,
    backend: mpsc::Sender<BackendCommand>,
    arbiter: InterruptionArbiter,
    batcher: Option<TranscriptBatcher>,
    recorder: Option<Recorder>,
    recording_failed: bool,
    current_response: Option<String>,
    streaming: bool,
    connected: bool,
    close_deadline: Option<Instant>,
    finalized: bool,
}

impl CallSession {
    /// Spawn the session task. The returned handle resolves when the
    /// session has fully finalized.
    pub fn spawn(
        id: String,
        caller_identity: String,
        ctx: RelayContext,
        events: mpsc::Receiver<SessionEvent>,
        caller: mpsc::Sender<CallFrame>,
        backend: mpsc::Sender<BackendCommand>,
    ) -> JoinHandle<()> {
        let arbiter = InterruptionArbiter::new(
            ctx.config.relay.min_speech(),
            ctx.config.relay.interruption_cooldown(),
        );
        let batcher = TranscriptBatcher::spawn(
            id.clone(),
            ctx.store.clone(),
            ctx.config.transcript.clone(),
        );

        let session = Self {
            id,
            caller_identity,
            ctx,
            events,
            caller,
            backend,
            arbiter,
            batcher: Some(batcher),
            recorder: None,
            recording_failed: false,
            current_response: None,
            streaming: false,
            connected: false,
            close_deadline: None,
            finalized: false,
        };

        tokio::spawn(session.run())
    }

    async fn run(mut self) {
        let record = SessionRecord::new(self.id.clone(), self.caller_identity.clone());
        if let Err(e) = self.ctx.store.upsert_session(&record).await {
            warn!(session = %self.id, "failed to persist session record: {e:#}");
        }
        info!(session = %self.id, caller = %self.caller_identity, "session started");

        let status = loop {
            let confirm_at = self.arbiter.deadline();
            let close_at = self.close_deadline;

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(status) = self.handle_event(event).await {
                            break status;
                        }
                    }
                    // Every transport task is gone; nothing can arrive anymore
                    None => break SessionStatus::Completed,
                },
                () = sleep_until(confirm_at), if confirm_at.is_some() => {
                    if self.arbiter.on_deadline(Instant::now()) {
                        self.execute_interruption().await;
                    }
                }
                () = sleep_until(close_at), if close_at.is_some() => {
                    debug!(session = %self.id, "close grace elapsed without disconnect signal");
                    break SessionStatus::Completed;
                }
            }
        };

        self.finalize(status).await;
    }

    /// Returns the terminal status once the session should end.
    async fn handle_event(&mut self, event: SessionEvent) -> Option<SessionStatus> {
        match event {
            SessionEvent::CallerAudio(bytes) => {
                self.on_caller_audio(bytes).await;
                None
            }
            SessionEvent::CallerAudioStop => {
                self.send_backend(BackendCommand::CommitInput).await;
                None
            }
            SessionEvent::Backend(event) => {
                self.on_backend_event(event).await;
                None
            }
            SessionEvent::CallClosed => {
                if self.close_deadline.is_none() {
                    self.close_deadline =
                        Some(Instant::now() + self.ctx.config.relay.close_grace());
                }
                None
            }
            SessionEvent::CallDisconnected => Some(SessionStatus::Completed),
            SessionEvent::BackendClosed { failed } => {
                if failed {
                    warn!(session = %self.id, "speech backend connection failed");
                    Some(SessionStatus::Error)
                } else {
                    info!(session = %self.id, "speech backend closed");
                    Some(SessionStatus::Completed)
                }
            }
        }
    }

    /// Caller audio goes to the backend input buffer and into the
    /// recording, in that order; neither write may block the other.
    async fn on_caller_audio(&mut self, bytes: Vec<u8>) {
        if !self.connected {
            debug!(session = %self.id, "caller audio before backend session established");
        }
        self.send_backend(BackendCommand::AppendAudio {
            bytes: bytes.clone(),
        })
        .await;
        self.record(AudioChunk::new(AudioOrigin::Caller, bytes));
    }

    async fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SessionEstablished { session_id } => {
                self.connected = true;
                info!(session = %self.id, backend_session = %session_id, "backend session established");
            }
            BackendEvent::ResponseStarted { response_id } => {
                debug!(session = %self.id, response = %response_id, "response started");
                self.current_response = Some(response_id);
                self.streaming = true;
                self.arbiter.on_response_started();
            }
            BackendEvent::ResponseCompleted => {
                debug!(session = %self.id, "response completed");
                self.current_response = None;
                self.streaming = false;
            }
            BackendEvent::SpeechActivityStarted => {
                self.arbiter.on_speech_started(Instant::now());
            }
            BackendEvent::SpeechActivityStopped => {
                if self.arbiter.on_speech_stopped(Instant::now()) {
                    self.execute_interruption().await;
                }
            }
            BackendEvent::AudioDelta { response_id, bytes } => {
                // Stale frames from a canceled or superseded response are
                // dropped before they reach the caller or the recording
                if !self.streaming || self.current_response.as_deref() != Some(response_id.as_str()) {
                    debug!(session = %self.id, response = %response_id, "dropping stale audio delta");
                    return;
                }
                self.record(AudioChunk::new(AudioOrigin::Assistant, bytes.clone()));
                self.send_caller(CallFrame::Audio(bytes)).await;
            }
            BackendEvent::Transcript(segment) => {
                if let Some(batcher) = &self.batcher {
                    batcher.push(segment);
                }
            }
        }
    }

    /// Confirmed barge-in: mute playback, cancel the in-flight response,
    /// resynchronize the backend input buffer, then hand the turn to the
    /// caller's utterance.
    async fn execute_interruption(&mut self) {
        info!(
            session = %self.id,
            response = self.current_response.as_deref().unwrap_or("-"),
            "caller interruption confirmed"
        );

        self.send_caller(CallFrame::StopAudio).await;

        if let Some(response_id) = self.current_response.clone() {
            self.send_backend(BackendCommand::CancelResponse { response_id })
                .await;
        }
        self.send_backend(BackendCommand::ClearInputBuffer).await;

        let tail = self.ctx.config.relay.tts_stop_tail();
        if tail > Duration::ZERO {
            tokio::time::sleep(tail).await;
        }

        self.send_backend(BackendCommand::CommitInput).await;

        self.current_response = None;
        self.streaming = false;
    }

    fn record(&mut self, chunk: AudioChunk) {
        if self.recorder.is_none() {
            if self.recording_failed {
                return;
            }
            let recording = &self.ctx.config.recording;
            match Recorder::start(
                &self.id,
                &recording.work_dir,
                recording.min_recording_bytes,
                recording.encoder_shutdown_timeout(),
                self.ctx.encoders.as_ref(),
            ) {
                Ok(recorder) => self.recorder = Some(recorder),
                Err(e) => {
                    // Recording never degrades the live call
                    warn!(session = %self.id, "recording unavailable: {e:#}");
                    self.recording_failed = true;
                    return;
                }
            }
        }

        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.write(chunk.bytes) {
                warn!(session = %self.id, "recording write failed: {e:#}");
            }
        }
    }

    async fn send_backend(&self, command: BackendCommand) {
        // Best-effort: a dead backend channel must not take down the session
        if self.backend.send(command).await.is_err() {
            debug!(session = %self.id, "backend command dropped, channel closed");
        }
    }

    async fn send_caller(&self, frame: CallFrame) {
        if self.caller.send(frame).await.is_err() {
            debug!(session = %self.id, "caller frame dropped, channel closed");
        }
    }

    /// Runs exactly once regardless of which termination path fired first:
    /// stop and upload the recording, flush the transcript buffer, mark the
    /// terminal status.
    async fn finalize(&mut self, status: SessionStatus) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        info!(session = %self.id, ?status, "finalizing session");

        if let Some(recorder) = self.recorder.take() {
            match recorder.stop().await {
                Ok(Some(artifact)) => self.store_artifact(artifact).await,
                Ok(None) => {
                    debug!(session = %self.id, "no recording artifact kept");
                }
                Err(e) => warn!(session = %self.id, "failed to stop recording: {e:#}"),
            }
        }

        if let Some(batcher) = self.batcher.take() {
            batcher.finish().await;
        }

        if let Err(e) = self.ctx.store.update_status(&self.id, status).await {
            warn!(session = %self.id, "failed to update session status: {e:#}");
        }

        info!(session = %self.id, "session finalized");
    }

    async fn store_artifact(&self, mut artifact: crate::recording::RecordingArtifact) {
        let key = artifact
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone());

        match self.ctx.objects.put(&key, &artifact.path).await {
            Ok(stored) => {
                artifact.uploaded_url = Some(stored.url);
                artifact.content_hash = Some(stored.sha256);
                // The working copy is disposable once uploaded
                Recorder::cleanup(&self.ctx.config.recording.work_dir, &self.id).await;
            }
            Err(e) => {
                warn!(session = %self.id, "artifact upload failed, keeping local copy: {e:#}");
            }
        }

        if let Err(e) = self.ctx.store.set_artifact(&self.id, &artifact).await {
            warn!(session = %self.id, "failed to persist artifact metadata: {e:#}");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
