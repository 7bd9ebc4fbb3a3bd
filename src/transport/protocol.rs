//! Wire types for the speech-backend realtime protocol.
//!
//! The backend speaks JSON messages tagged by a `type` field over a
//! websocket: the bridge appends caller audio to an input buffer, the
//! backend answers with response lifecycle events, audio deltas and
//! transcripts. Unknown server message types deserialize to `Unknown`
//! instead of failing, so protocol additions never break the relay.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Session tuning sent right after connect
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

impl SessionParams {
    /// Server-side voice activity detection with the tuning the bridge
    /// relies on for speech-activity events.
    pub fn server_vad() -> Self {
        Self {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            input_audio_format: Some("pcm16".to_string()),
            turn_detection: Some(TurnDetection {
                detection_type: "server_vad".to_string(),
                threshold: Some(0.3),
                prefix_padding_ms: Some(200),
                silence_duration_ms: Some(200),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub error_type: String,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Client messages (sent TO the backend)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionParams },

    /// Append base64 PCM16 audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend { audio: String },

    /// Commit the input buffer, forcing the backend to process it
    #[serde(rename = "input_audio_buffer.commit")]
    AudioCommit,

    /// Discard any uncommitted input audio
    #[serde(rename = "input_audio_buffer.clear")]
    AudioClear,

    /// Ask the backend to produce a response
    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Cancel an in-flight response
    #[serde(rename = "response.cancel")]
    ResponseCancel { response_id: String },
}

impl ClientMessage {
    pub fn audio_append(pcm: &[u8]) -> Self {
        Self::AudioAppend {
            audio: STANDARD.encode(pcm),
        }
    }
}

// ============================================================================
// Server messages (received FROM the backend)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "error")]
    Error { error: ErrorInfo },

    /// Voice activity detected in the caller's audio
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
    },

    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseInfo },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseInfo>,
    },

    /// Synthesized audio for an in-flight response, base64 PCM16
    #[serde(rename = "response.audio.delta")]
    AudioDelta { response_id: String, delta: String },

    /// Final transcription of a caller utterance
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptCompleted {
        transcript: String,
        #[serde(default)]
        start_ms: Option<u64>,
        #[serde(default)]
        end_ms: Option<u64>,
        #[serde(default)]
        confidence: Option<f32>,
    },

    /// Final transcript of a synthesized response
    #[serde(rename = "response.audio_transcript.done")]
    ResponseTranscriptDone {
        transcript: String,
        #[serde(default)]
        start_ms: Option<u64>,
        #[serde(default)]
        end_ms: Option<u64>,
    },

    /// Catch-all so unknown message types never fail deserialization
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_append_serializes_with_tag() {
        let msg = ClientMessage::audio_append(&[0x34, 0x12, 0x78, 0x56]);
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"input_audio_buffer.append\""));
        assert!(json.contains("\"audio\":\"NBJ4Vg==\""));
    }

    #[test]
    fn response_cancel_carries_response_id() {
        let msg = ClientMessage::ResponseCancel {
            response_id: "resp_1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"response.cancel\""));
        assert!(json.contains("\"response_id\":\"resp_1\""));
    }

    #[test]
    fn session_update_includes_vad_params() {
        let msg = ClientMessage::SessionUpdate {
            session: SessionParams::server_vad(),
        };
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"session.update\""));
        assert!(json.contains("\"server_vad\""));
        assert!(json.contains("\"input_audio_format\":\"pcm16\""));
    }

    #[test]
    fn deserializes_response_created() {
        let json = r#"{"type":"response.created","response":{"id":"resp_9"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        match msg {
            ServerMessage::ResponseCreated { response } => assert_eq!(response.id, "resp_9"),
            other => panic!("expected ResponseCreated, got {other:?}"),
        }
    }

    #[test]
    fn deserializes_audio_delta() {
        let json = r#"{"type":"response.audio.delta","response_id":"resp_9","delta":"AAA="}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        match msg {
            ServerMessage::AudioDelta { response_id, delta } => {
                assert_eq!(response_id, "resp_9");
                assert_eq!(STANDARD.decode(delta).unwrap(), vec![0, 0]);
            }
            other => panic!("expected AudioDelta, got {other:?}"),
        }
    }

    #[test]
    fn deserializes_speech_started_without_offset() {
        let json = r#"{"type":"input_audio_buffer.speech_started"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(
            msg,
            ServerMessage::SpeechStarted {
                audio_start_ms: None
            }
        ));
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let json = r#"{"type":"some.future.event","payload":42}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(msg, ServerMessage::Unknown));
    }
}
