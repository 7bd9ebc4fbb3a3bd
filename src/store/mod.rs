pub mod memory;
pub mod object;

pub use memory::MemoryStore;
pub use object::{FsObjectStore, ObjectStore, StoredObject};

use crate::recording::RecordingArtifact;
use crate::transcript::TranscriptSegment;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle status; progression is monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Durable record of one bridged call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,

    /// Opaque caller identity, passed through unvalidated
    pub caller_identity: String,

    pub status: SessionStatus,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Present only when a recording survived the minimum-size filter
    pub artifact: Option<RecordingArtifact>,
}

impl SessionRecord {
    pub fn new(id: String, caller_identity: String) -> Self {
        Self {
            id,
            caller_identity,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            artifact: None,
        }
    }
}

/// Persistence boundary for session documents and ordered transcripts.
///
/// `reserve_sequence` must be an atomic increment-and-read so that
/// concurrent flushes cannot interleave a sequence range.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()>;

    /// Terminal statuses win; an update back to `Active` is ignored.
    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    /// Atomically advance the session's sequence counter by `count` and
    /// return the new value. The reserved range is
    /// `new_value - count + 1 ..= new_value`.
    async fn reserve_sequence(&self, session_id: &str, count: u64) -> Result<u64>;

    /// Append a flushed batch. Segments must carry assigned `seq` values;
    /// the write is an upsert keyed by `(session_id, seq)` so a retried
    /// batch cannot duplicate rows.
    async fn append_segments(&self, session_id: &str, segments: &[TranscriptSegment])
        -> Result<()>;

    async fn set_artifact(&self, session_id: &str, artifact: &RecordingArtifact) -> Result<()>;

    async fn fetch_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Segments in sequence order.
    async fn fetch_segments(&self, session_id: &str) -> Result<Vec<TranscriptSegment>>;
}
