use super::{SessionRecord, SessionStatus, SessionStore};
use crate::recording::RecordingArtifact;
use crate::transcript::TranscriptSegment;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-memory session store.
///
/// Backs the HTTP query surface in single-node deployments and every test;
/// a durable store plugs in behind the same trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, StoredSession>>,
}

struct StoredSession {
    record: SessionRecord,
    sequence: u64,
    segments: BTreeMap<u64, TranscriptSegment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.get_mut(&record.id) {
            Some(existing) => existing.record = record.clone(),
            None => {
                inner.insert(
                    record.id.clone(),
                    StoredSession {
                        record: record.clone(),
                        sequence: 0,
                        segments: BTreeMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .get_mut(session_id)
            .with_context(|| format!("unknown session: {session_id}"))?;

        // Monotonic progression: never step back from a terminal status
        if session.record.status.is_terminal() {
            return Ok(());
        }
        session.record.status = status;
        if status.is_terminal() {
            session.record.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn reserve_sequence(&self, session_id: &str, count: u64) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let session = inner
            .get_mut(session_id)
            .with_context(|| format!("unknown session: {session_id}"))?;
        session.sequence += count;
        Ok(session.sequence)
    }

    async fn append_segments(
        &self,
        session_id: &str,
        segments: &[TranscriptSegment],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .get_mut(session_id)
            .with_context(|| format!("unknown session: {session_id}"))?;
        for segment in segments {
            let seq = segment
                .seq
                .ok_or_else(|| anyhow!("segment appended without assigned seq"))?;
            session.segments.insert(seq, segment.clone());
        }
        Ok(())
    }

    async fn set_artifact(&self, session_id: &str, artifact: &RecordingArtifact) -> Result<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .get_mut(session_id)
            .with_context(|| format!("unknown session: {session_id}"))?;
        session.record.artifact = Some(artifact.clone());
        Ok(())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.get(session_id).map(|s| s.record.clone()))
    }

    async fn fetch_segments(&self, session_id: &str) -> Result<Vec<TranscriptSegment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .get(session_id)
            .map(|s| s.segments.values().cloned().collect())
            .unwrap_or_default())
    }
}
