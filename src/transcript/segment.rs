use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation produced a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// A single transcript segment from the speech backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text
    pub text: String,

    /// Utterance start, milliseconds into the call
    pub start_ms: u64,

    /// Utterance end, milliseconds into the call
    pub end_ms: u64,

    pub speaker: Speaker,

    /// Confidence score (0.0 to 1.0), if available
    pub confidence: Option<f32>,

    /// Total order within the session; unassigned until batch flush
    pub seq: Option<u64>,

    /// When this segment was received
    pub received_at: DateTime<Utc>,
}

impl TranscriptSegment {
    pub fn new(speaker: Speaker, text: String, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text,
            start_ms,
            end_ms,
            speaker,
            confidence: None,
            seq: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
        self.confidence = confidence;
        self
    }
}
