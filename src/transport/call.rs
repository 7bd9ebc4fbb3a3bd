//! JSON envelope spoken by the telephony media transport.
//!
//! Inbound frames arrive with either casing of the field names depending on
//! the sender; outbound frames use the capitalized form. Anything that does
//! not parse is treated as transport noise and dropped without ceremony.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallEnvelope {
    #[serde(rename = "Kind", alias = "kind")]
    pub kind: String,

    #[serde(
        rename = "AudioData",
        alias = "audioData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_data: Option<AudioPayload>,

    #[serde(
        rename = "StopAudio",
        alias = "stopAudio",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_audio: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Base64-encoded PCM bytes
    #[serde(rename = "Data", alias = "data")]
    pub data: String,
}

/// Decoded inbound frame from the caller transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCallFrame {
    Audio(Vec<u8>),
    StopAudio,
}

impl CallEnvelope {
    /// Parse an inbound text frame. `None` means noise: malformed JSON, an
    /// unknown kind, or an undecodable payload.
    pub fn decode(text: &str) -> Option<InboundCallFrame> {
        let envelope: CallEnvelope = serde_json::from_str(text).ok()?;
        match envelope.kind.as_str() {
            "AudioData" => {
                let payload = envelope.audio_data?;
                let bytes = STANDARD.decode(payload.data).ok()?;
                Some(InboundCallFrame::Audio(bytes))
            }
            "StopAudio" => Some(InboundCallFrame::StopAudio),
            _ => None,
        }
    }

    pub fn audio(bytes: &[u8]) -> Self {
        Self {
            kind: "AudioData".to_string(),
            audio_data: Some(AudioPayload {
                data: STANDARD.encode(bytes),
            }),
            stop_audio: None,
        }
    }

    pub fn stop_audio() -> Self {
        Self {
            kind: "StopAudio".to_string(),
            audio_data: None,
            stop_audio: Some(serde_json::json!({})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_audio_frame() {
        let text = r#"{"kind":"AudioData","audioData":{"data":"AQID"}}"#;
        assert_eq!(
            CallEnvelope::decode(text),
            Some(InboundCallFrame::Audio(vec![1, 2, 3]))
        );
    }

    #[test]
    fn decodes_pascal_case_audio_frame() {
        let text = r#"{"Kind":"AudioData","AudioData":{"Data":"AQID"}}"#;
        assert_eq!(
            CallEnvelope::decode(text),
            Some(InboundCallFrame::Audio(vec![1, 2, 3]))
        );
    }

    #[test]
    fn decodes_stop_audio() {
        let text = r#"{"kind":"StopAudio","stopAudio":{}}"#;
        assert_eq!(CallEnvelope::decode(text), Some(InboundCallFrame::StopAudio));
    }

    #[test]
    fn malformed_frames_are_noise() {
        assert_eq!(CallEnvelope::decode("not json"), None);
        assert_eq!(CallEnvelope::decode(r#"{"kind":"Telemetry"}"#), None);
        assert_eq!(
            CallEnvelope::decode(r#"{"kind":"AudioData","audioData":{"data":"!!"}}"#),
            None
        );
    }

    #[test]
    fn outbound_audio_roundtrips() {
        let envelope = CallEnvelope::audio(&[9, 8, 7]);
        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            CallEnvelope::decode(&text),
            Some(InboundCallFrame::Audio(vec![9, 8, 7]))
        );
    }

    #[test]
    fn outbound_stop_audio_has_marker() {
        let text = serde_json::to_string(&CallEnvelope::stop_audio()).unwrap();
        assert!(text.contains("\"Kind\":\"StopAudio\""));
        assert!(text.contains("\"StopAudio\":{}"));
    }
}
