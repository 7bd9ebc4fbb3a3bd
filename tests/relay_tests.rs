// End-to-end tests for the duplex relay core
//
// A session is driven through its event channel exactly the way the
// transports drive it in production; the caller and backend transports are
// replaced with bare channels so every outbound frame and command can be
// observed.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use voice_bridge::recording::WavEncoderFactory;
use voice_bridge::store::{FsObjectStore, MemoryStore, SessionStatus, SessionStore};
use voice_bridge::transcript::{Speaker, TranscriptSegment};
use voice_bridge::{
    BackendCommand, BackendEvent, CallFrame, CallSession, Config, RelayContext, SessionEvent,
};

struct Bridge {
    events: mpsc::Sender<SessionEvent>,
    caller_rx: mpsc::Receiver<CallFrame>,
    backend_rx: mpsc::Receiver<BackendCommand>,
    store: Arc<MemoryStore>,
    task: JoinHandle<()>,
    // Keeps the working/artifact directories alive for the test's duration
    temp: TempDir,
}

impl Bridge {
    async fn spawn(session_id: &str) -> Result<Self> {
        let temp = TempDir::new()?;

        let mut config = Config::default();
        config.recording.work_dir = temp.path().join("work");
        config.recording.artifact_dir = temp.path().join("artifacts");

        let store = Arc::new(MemoryStore::new());
        let ctx = RelayContext {
            store: store.clone(),
            objects: Arc::new(FsObjectStore::new(config.recording.artifact_dir.clone())?),
            encoders: Arc::new(WavEncoderFactory { sample_rate: 16000 }),
            config: Arc::new(config),
        };

        let (events, events_rx) = mpsc::channel(256);
        let (caller_tx, caller_rx) = mpsc::channel(64);
        let (backend_tx, backend_rx) = mpsc::channel(64);

        let task = CallSession::spawn(
            session_id.to_string(),
            "+15550100".to_string(),
            ctx,
            events_rx,
            caller_tx,
            backend_tx,
        );

        Ok(Self {
            events,
            caller_rx,
            backend_rx,
            store,
            task,
            temp,
        })
    }

    async fn send(&self, event: SessionEvent) {
        self.events.send(event).await.expect("session terminated");
    }

    async fn backend_command(&mut self) -> BackendCommand {
        timeout(Duration::from_secs(1), self.backend_rx.recv())
            .await
            .expect("timed out waiting for backend command")
            .expect("backend channel closed")
    }

    async fn caller_frame(&mut self) -> CallFrame {
        timeout(Duration::from_secs(1), self.caller_rx.recv())
            .await
            .expect("timed out waiting for caller frame")
            .expect("caller channel closed")
    }

    async fn assert_quiet(&mut self) {
        assert!(
            timeout(Duration::from_millis(200), self.backend_rx.recv())
                .await
                .is_err(),
            "unexpected backend command"
        );
        assert!(
            timeout(Duration::from_millis(200), self.caller_rx.recv())
                .await
                .is_err(),
            "unexpected caller frame"
        );
    }

    async fn disconnect_and_join(self) -> (Arc<MemoryStore>, TempDir) {
        let _ = self.events.send(SessionEvent::CallDisconnected).await;
        self.task.await.expect("session task panicked");
        (self.store, self.temp)
    }
}

fn pcm(len: usize) -> Vec<u8> {
    vec![0u8; len]
}

// ============================================================================
// Scenario A: empty session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn empty_session_completes_without_artifact_or_transcript() -> Result<()> {
    let bridge = Bridge::spawn("empty").await?;
    let (store, temp) = bridge.disconnect_and_join().await;

    let record = store.fetch_session("empty").await?.expect("record missing");
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(record.ended_at.is_some());
    assert!(record.artifact.is_none());
    assert!(store.fetch_segments("empty").await?.is_empty());
    assert!(
        !temp.path().join("work").join("empty").exists(),
        "no working area should have been created"
    );

    Ok(())
}

// ============================================================================
// Caller audio path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn caller_audio_is_appended_and_recorded() -> Result<()> {
    let mut bridge = Bridge::spawn("call-audio").await?;

    bridge.send(SessionEvent::CallerAudio(pcm(3200))).await;
    match bridge.backend_command().await {
        BackendCommand::AppendAudio { bytes } => assert_eq!(bytes.len(), 3200),
        other => panic!("expected AppendAudio, got {other:?}"),
    }

    bridge.send(SessionEvent::CallerAudioStop).await;
    assert!(matches!(
        bridge.backend_command().await,
        BackendCommand::CommitInput
    ));

    let (store, temp) = bridge.disconnect_and_join().await;

    let record = store.fetch_session("call-audio").await?.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);

    // 3200 PCM bytes beat the 1024-byte floor; the artifact is uploaded
    // and its working copy removed
    let artifact = record.artifact.expect("artifact expected");
    assert_eq!(artifact.size_bytes, 3200 + 44);
    let url = artifact.uploaded_url.expect("upload expected");
    assert!(url.starts_with("file://"));
    assert!(artifact.content_hash.is_some());
    assert!(temp
        .path()
        .join("artifacts")
        .join("call-audio.wav")
        .exists());
    assert!(!temp.path().join("work").join("call-audio").exists());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tiny_recording_is_discarded() -> Result<()> {
    let mut bridge = Bridge::spawn("tiny").await?;

    bridge.send(SessionEvent::CallerAudio(pcm(100))).await;
    bridge.backend_command().await; // the append still goes upstream

    let (store, temp) = bridge.disconnect_and_join().await;

    let record = store.fetch_session("tiny").await?.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(record.artifact.is_none());
    assert!(!temp.path().join("work").join("tiny").exists());

    Ok(())
}

// ============================================================================
// Scenario B: sub-threshold speech activity is noise
// ============================================================================

#[tokio::test(start_paused = true)]
async fn short_speech_activity_causes_no_interruption() -> Result<()> {
    let mut bridge = Bridge::spawn("noise").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r1".to_string(),
        }))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStarted))
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStopped))
        .await;

    // 100ms < min_speech_ms(250): no cancel, no mute
    bridge.assert_quiet().await;

    bridge.disconnect_and_join().await;
    Ok(())
}

// ============================================================================
// Scenario C: sustained speech confirms via the timer
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sustained_speech_interrupts_exactly_once() -> Result<()> {
    let mut bridge = Bridge::spawn("barge-in").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r1".to_string(),
        }))
        .await;

    let t0 = Instant::now();
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStarted))
        .await;

    // No stop event: the confirmation timer fires at min_speech_ms
    assert!(matches!(bridge.caller_frame().await, CallFrame::StopAudio));
    match bridge.backend_command().await {
        BackendCommand::CancelResponse { response_id } => assert_eq!(response_id, "r1"),
        other => panic!("expected CancelResponse, got {other:?}"),
    }
    assert!(matches!(
        bridge.backend_command().await,
        BackendCommand::ClearInputBuffer
    ));
    assert!(matches!(
        bridge.backend_command().await,
        BackendCommand::CommitInput
    ));

    let elapsed = Instant::now().duration_since(t0);
    assert!(
        elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(400),
        "interruption latency must be bounded by min_speech_ms, was {elapsed:?}"
    );

    // A late stop event and further activity inside the cooldown must not
    // trigger a second interruption
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStopped))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStarted))
        .await;
    bridge.assert_quiet().await;

    bridge.disconnect_and_join().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_response_after_cooldown_can_be_interrupted_again() -> Result<()> {
    let mut bridge = Bridge::spawn("twice").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r1".to_string(),
        }))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStarted))
        .await;

    assert!(matches!(bridge.caller_frame().await, CallFrame::StopAudio));
    assert!(matches!(
        bridge.backend_command().await,
        BackendCommand::CancelResponse { .. }
    ));
    bridge.backend_command().await; // clear
    bridge.backend_command().await; // commit

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseCompleted))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r2".to_string(),
        }))
        .await;

    // Past the cooldown a fresh interruption arms against r2
    tokio::time::sleep(Duration::from_millis(1100)).await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::SpeechActivityStarted))
        .await;

    assert!(matches!(bridge.caller_frame().await, CallFrame::StopAudio));
    match bridge.backend_command().await {
        BackendCommand::CancelResponse { response_id } => assert_eq!(response_id, "r2"),
        other => panic!("expected CancelResponse for r2, got {other:?}"),
    }

    bridge.disconnect_and_join().await;
    Ok(())
}

// ============================================================================
// Scenario D: stale audio deltas
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deltas_for_current_response_are_forwarded() -> Result<()> {
    let mut bridge = Bridge::spawn("forward").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r1".to_string(),
        }))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::AudioDelta {
            response_id: "r1".to_string(),
            bytes: vec![1, 2, 3, 4],
        }))
        .await;

    match bridge.caller_frame().await {
        CallFrame::Audio(bytes) => assert_eq!(bytes, vec![1, 2, 3, 4]),
        other => panic!("expected Audio, got {other:?}"),
    }

    bridge.disconnect_and_join().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deltas_after_completion_are_dropped_everywhere() -> Result<()> {
    let mut bridge = Bridge::spawn("stale").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r1".to_string(),
        }))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseCompleted))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::AudioDelta {
            response_id: "r1".to_string(),
            bytes: pcm(3200),
        }))
        .await;

    bridge.assert_quiet().await;

    let (store, temp) = bridge.disconnect_and_join().await;

    // Dropped deltas never reach the recording pipeline either: no working
    // area, no artifact
    let record = store.fetch_session("stale").await?.unwrap();
    assert!(record.artifact.is_none());
    assert!(!temp.path().join("work").join("stale").exists());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deltas_for_superseded_response_are_dropped() -> Result<()> {
    let mut bridge = Bridge::spawn("superseded").await?;

    bridge
        .send(SessionEvent::Backend(BackendEvent::ResponseStarted {
            response_id: "r2".to_string(),
        }))
        .await;
    bridge
        .send(SessionEvent::Backend(BackendEvent::AudioDelta {
            response_id: "r1".to_string(),
            bytes: vec![9, 9],
        }))
        .await;
    bridge.assert_quiet().await;

    bridge
        .send(SessionEvent::Backend(BackendEvent::AudioDelta {
            response_id: "r2".to_string(),
            bytes: vec![7, 7],
        }))
        .await;
    assert!(matches!(bridge.caller_frame().await, CallFrame::Audio(_)));

    bridge.disconnect_and_join().await;
    Ok(())
}

// ============================================================================
// Transcripts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transcripts_are_persisted_in_order() -> Result<()> {
    let bridge = Bridge::spawn("talk").await?;

    let lines = [
        (Speaker::User, "hi there"),
        (Speaker::Assistant, "hello, how can I help?"),
        (Speaker::User, "what time is it"),
    ];
    for (speaker, text) in lines {
        bridge
            .send(SessionEvent::Backend(BackendEvent::Transcript(
                TranscriptSegment::new(speaker, text.to_string(), 0, 0),
            )))
            .await;
    }

    let (store, _temp) = bridge.disconnect_and_join().await;

    let segments = store.fetch_segments("talk").await?;
    assert_eq!(segments.len(), 3);
    for (i, (speaker, text)) in lines.iter().enumerate() {
        assert_eq!(segments[i].seq, Some(i as u64 + 1));
        assert_eq!(segments[i].speaker, *speaker);
        assert_eq!(segments[i].text, *text);
    }

    Ok(())
}

// ============================================================================
// Termination races
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transport_close_finalizes_after_grace_period() -> Result<()> {
    let bridge = Bridge::spawn("grace").await?;

    bridge.send(SessionEvent::CallClosed).await;

    let mut task = bridge.task;
    // Still waiting for an explicit disconnect signal
    assert!(
        timeout(Duration::from_secs(4), &mut task).await.is_err(),
        "session must hold through the grace period"
    );
    // Grace expires at 5s and the session finalizes on its own
    timeout(Duration::from_secs(2), &mut task)
        .await
        .expect("session should finalize after grace")
        .expect("session task panicked");

    let record = bridge.store.fetch_session("grace").await?.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_grace_finalizes_once() -> Result<()> {
    let bridge = Bridge::spawn("race").await?;

    bridge.send(SessionEvent::CallClosed).await;
    bridge.send(SessionEvent::CallDisconnected).await;

    let mut task = bridge.task;
    timeout(Duration::from_secs(1), &mut task)
        .await
        .expect("disconnect should finalize immediately")
        .expect("session task panicked");

    let record = bridge.store.fetch_session("race").await?.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(record.ended_at.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn backend_failure_marks_session_errored() -> Result<()> {
    let bridge = Bridge::spawn("lost").await?;

    bridge
        .send(SessionEvent::BackendClosed { failed: true })
        .await;

    let mut task = bridge.task;
    timeout(Duration::from_secs(1), &mut task)
        .await
        .expect("backend loss should terminate the session")
        .expect("session task panicked");

    let record = bridge.store.fetch_session("lost").await?.unwrap();
    assert_eq!(record.status, SessionStatus::Error);

    Ok(())
}
