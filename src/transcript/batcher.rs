use super::TranscriptSegment;
use crate::config::TranscriptConfig;
use crate::store::SessionStore;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

enum BatcherMsg {
    Push(TranscriptSegment),
    Flush(oneshot::Sender<()>),
}

/// Per-session transcript sequencer and batcher.
///
/// Buffers segments in push order and flushes them to the store either when
/// the buffer reaches `max_batch_size` or after `flush_delay_ms` of
/// inactivity. Sequence numbers are reserved as a contiguous range through
/// the store's atomic counter at flush time, so ordering holds across
/// processes.
pub struct TranscriptBatcher {
    tx: mpsc::UnboundedSender<BatcherMsg>,
    task: JoinHandle<()>,
}

impl TranscriptBatcher {
    pub fn spawn(
        session_id: String,
        store: Arc<dyn SessionStore>,
        config: TranscriptConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(session_id, store, config, rx));
        Self { tx, task }
    }

    /// Append a segment; triggers an immediate flush at `max_batch_size`,
    /// otherwise (re)schedules a debounced flush.
    pub fn push(&self, segment: TranscriptSegment) {
        if self.tx.send(BatcherMsg::Push(segment)).is_err() {
            warn!("transcript batcher already stopped, segment dropped");
        }
    }

    /// Flush any buffered segments and wait for the flush to land. Part of
    /// session finalization; no buffered segment may be lost on
    /// termination.
    pub async fn finish(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(BatcherMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn run(
    session_id: String,
    store: Arc<dyn SessionStore>,
    config: TranscriptConfig,
    mut rx: mpsc::UnboundedReceiver<BatcherMsg>,
) {
    let mut buffer: VecDeque<TranscriptSegment> = VecDeque::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(BatcherMsg::Push(segment)) => {
                    buffer.push_back(segment);
                    if buffer.len() >= config.max_batch_size {
                        flush(&session_id, store.as_ref(), &mut buffer).await;
                    }
                    deadline = next_deadline(&buffer, &config);
                }
                Some(BatcherMsg::Flush(ack)) => {
                    flush(&session_id, store.as_ref(), &mut buffer).await;
                    deadline = next_deadline(&buffer, &config);
                    let _ = ack.send(());
                }
                None => {
                    flush(&session_id, store.as_ref(), &mut buffer).await;
                    break;
                }
            },
            () = sleep_until(deadline), if deadline.is_some() => {
                flush(&session_id, store.as_ref(), &mut buffer).await;
                deadline = next_deadline(&buffer, &config);
            }
        }
    }

    if !buffer.is_empty() {
        warn!(
            session = %session_id,
            pending = buffer.len(),
            "transcript segments lost after repeated persistence failures"
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// A non-empty buffer after a flush means the flush failed; the same delay
// doubles as the retry backoff.
fn next_deadline(buffer: &VecDeque<TranscriptSegment>, config: &TranscriptConfig) -> Option<Instant> {
    (!buffer.is_empty()).then(|| Instant::now() + config.flush_delay())
}

/// Reserve sequence numbers for unassigned segments, then append the batch
/// in one store call. On failure the batch returns to the front of the
/// buffer; already-assigned `seq` values are kept so the retried write is
/// idempotent under the store's `(session_id, seq)` upsert.
async fn flush(
    session_id: &str,
    store: &dyn SessionStore,
    buffer: &mut VecDeque<TranscriptSegment>,
) {
    if buffer.is_empty() {
        return;
    }

    let mut batch: Vec<TranscriptSegment> = buffer.drain(..).collect();

    let unassigned = batch.iter().filter(|s| s.seq.is_none()).count() as u64;
    if unassigned > 0 {
        match store.reserve_sequence(session_id, unassigned).await {
            Ok(new_value) => {
                let mut next = new_value - unassigned + 1;
                for segment in batch.iter_mut().filter(|s| s.seq.is_none()) {
                    segment.seq = Some(next);
                    next += 1;
                }
            }
            Err(e) => {
                warn!(session = %session_id, "sequence reservation failed: {e:#}");
                requeue(buffer, batch);
                return;
            }
        }
    }

    match store.append_segments(session_id, &batch).await {
        Ok(()) => debug!(session = %session_id, count = batch.len(), "transcript batch flushed"),
        Err(e) => {
            warn!(session = %session_id, "transcript flush failed, will retry: {e:#}");
            requeue(buffer, batch);
        }
    }
}

fn requeue(buffer: &mut VecDeque<TranscriptSegment>, batch: Vec<TranscriptSegment>) {
    for segment in batch.into_iter().rev() {
        buffer.push_front(segment);
    }
}
