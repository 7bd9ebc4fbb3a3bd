use super::encoder::EncoderFactory;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Finalized recording of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingArtifact {
    pub session_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
    pub uploaded_url: Option<String>,
}

/// Per-session recording pipeline.
///
/// `write` enqueues onto a FIFO consumed by a single drain task; the drain
/// suspends on encoder backpressure while the relay keeps running. Byte
/// order is preserved end to end and nothing is dropped.
pub struct Recorder {
    session_id: String,
    session_dir: PathBuf,
    artifact_path: PathBuf,
    min_bytes: u64,
    shutdown_timeout: Duration,
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    drain: Option<JoinHandle<()>>,
    bytes_queued: u64,
}

impl Recorder {
    /// Allocate the working area, attach an encoder sink and start the
    /// drain task. Called once per session, on the first captured byte.
    pub fn start(
        session_id: &str,
        work_dir: &Path,
        min_bytes: u64,
        shutdown_timeout: Duration,
        factory: &dyn EncoderFactory,
    ) -> Result<Self> {
        let session_dir = work_dir.join(session_id);
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("failed to create working area: {:?}", session_dir))?;

        let mut sink = factory.create(&session_dir, session_id)?;
        let artifact_path = sink.artifact_path().to_path_buf();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let id = session_id.to_string();

        let drain = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = sink.write(&bytes).await {
                    // Recording is best-effort relative to the live call;
                    // drop the rest of the stream, keep what was encoded.
                    error!(session = %id, "encoder write failed: {e:#}");
                    break;
                }
            }
            if let Err(e) = sink.finish(shutdown_timeout).await {
                error!(session = %id, "encoder finalize failed: {e:#}");
            }
        });

        info!(session = %session_id, path = ?artifact_path, "recording started");

        Ok(Self {
            session_id: session_id.to_string(),
            session_dir,
            artifact_path,
            min_bytes,
            shutdown_timeout,
            tx: Some(tx),
            drain: Some(drain),
            bytes_queued: 0,
        })
    }

    /// Enqueue raw PCM. Never suspends on encoder backpressure.
    pub fn write(&mut self, bytes: Vec<u8>) -> Result<()> {
        let tx = self.tx.as_ref().context("recorder already stopped")?;
        self.bytes_queued += bytes.len() as u64;
        tx.send(bytes).map_err(|_| anyhow!("recording queue closed"))
    }

    pub fn bytes_queued(&self) -> u64 {
        self.bytes_queued
    }

    /// Signal end-of-input, await the encoder (bounded), and inspect the
    /// result. Sub-threshold artifacts are deleted along with the working
    /// area and `None` is returned.
    pub async fn stop(mut self) -> Result<Option<RecordingArtifact>> {
        // Closing the queue lets the drain finish the remaining backlog
        drop(self.tx.take());

        if let Some(mut drain) = self.drain.take() {
            // The drain bounds encoder shutdown itself; the outer timeout
            // covers a sink stuck mid-write.
            let grace = self.shutdown_timeout + Duration::from_secs(1);
            match tokio::time::timeout(grace, &mut drain).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(session = %self.session_id, "recording drain panicked: {e}"),
                Err(_) => {
                    warn!(session = %self.session_id, "recording drain stalled, force finalizing");
                    drain.abort();
                }
            }
        }

        let size_bytes = match tokio::fs::metadata(&self.artifact_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if size_bytes < self.min_bytes {
            debug!(
                session = %self.session_id,
                size_bytes, "recording below minimum size, discarding"
            );
            Self::remove_dir(&self.session_dir).await;
            return Ok(None);
        }

        info!(session = %self.session_id, size_bytes, "recording finalized");

        Ok(Some(RecordingArtifact {
            session_id: self.session_id.clone(),
            path: self.artifact_path.clone(),
            size_bytes,
            content_hash: None,
            uploaded_url: None,
        }))
    }

    /// Best-effort removal of a session's working area; safe when nothing
    /// exists.
    pub async fn cleanup(work_dir: &Path, session_id: &str) {
        Self::remove_dir(&work_dir.join(session_id)).await;
    }

    async fn remove_dir(dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove working area {:?}: {}", dir, e);
            }
        }
    }
}
