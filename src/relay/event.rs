use crate::transcript::TranscriptSegment;
use chrono::{DateTime, Utc};

/// Where an audio chunk entered the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOrigin {
    Caller,
    Assistant,
}

/// Raw PCM chunk moving through the relay. Ownership transfers from the
/// transport to the session and from the session into the recording queue.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub origin: AudioOrigin,
    pub bytes: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(origin: AudioOrigin, bytes: Vec<u8>) -> Self {
        Self {
            origin,
            bytes,
            received_at: Utc::now(),
        }
    }
}

/// Typed events from the speech-backend transport
#[derive(Debug, Clone)]
pub enum BackendEvent {
    SessionEstablished { session_id: String },
    ResponseStarted { response_id: String },
    ResponseCompleted,
    SpeechActivityStarted,
    SpeechActivityStopped,
    AudioDelta { response_id: String, bytes: Vec<u8> },
    Transcript(TranscriptSegment),
}

/// Commands accepted by the speech-backend transport
#[derive(Debug, Clone)]
pub enum BackendCommand {
    AppendAudio { bytes: Vec<u8> },
    CommitInput,
    CancelResponse { response_id: String },
    ClearInputBuffer,
}

/// Frames sent to the caller transport
#[derive(Debug, Clone)]
pub enum CallFrame {
    Audio(Vec<u8>),
    /// Tells the telephony side to stop playing buffered assistant audio
    StopAudio,
}

/// Everything a session reacts to, serialized through its event channel
#[derive(Debug)]
pub enum SessionEvent {
    /// Audio frame from the caller transport
    CallerAudio(Vec<u8>),

    /// End-of-utterance framing from the caller transport
    CallerAudioStop,

    Backend(BackendEvent),

    /// Caller transport socket closed; finalize after the grace period
    /// unless an explicit disconnect arrives first
    CallClosed,

    /// Explicit call-terminated signal; finalize immediately
    CallDisconnected,

    /// Backend transport ended; `failed` distinguishes an error from a
    /// clean close
    BackendClosed { failed: bool },
}
