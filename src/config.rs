use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub bind: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-bridge".to_string(),
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Speech-backend websocket endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: String,

    /// Connection attempts before the session is declared unreachable
    pub connect_attempts: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/realtime".to_string(),
            connect_attempts: 3,
        }
    }
}

/// Interruption arbitration and session lifecycle timing.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Minimum caller speech duration before an interruption is confirmed
    pub min_speech_ms: u64,

    /// Suppression window after a confirmed interruption
    pub interruption_cooldown_secs: u64,

    /// Optional drain delay between muting playback and committing caller input
    pub tts_stop_tail_ms: u64,

    /// Grace period after transport close before finalize is forced
    pub close_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            min_speech_ms: 250,
            interruption_cooldown_secs: 1,
            tts_stop_tail_ms: 0,
            close_grace_secs: 5,
        }
    }
}

impl RelayConfig {
    pub fn min_speech(&self) -> Duration {
        Duration::from_millis(self.min_speech_ms)
    }

    pub fn interruption_cooldown(&self) -> Duration {
        Duration::from_secs(self.interruption_cooldown_secs)
    }

    pub fn tts_stop_tail(&self) -> Duration {
        Duration::from_millis(self.tts_stop_tail_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.close_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Working area for in-flight recordings (one subdirectory per session)
    pub work_dir: PathBuf,

    /// Destination for uploaded artifacts (filesystem object store)
    pub artifact_dir: PathBuf,

    /// Artifacts smaller than this are discarded on stop
    pub min_recording_bytes: u64,

    /// Sample rate of the PCM fed to the encoder
    pub encoder_sample_rate: u32,

    /// Encoder sink: "wav" (built-in) or "ffmpeg" (external process)
    pub encoder: String,

    /// Bound on waiting for the encoder to finish at stop
    pub encoder_shutdown_timeout_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("recordings"),
            artifact_dir: PathBuf::from("artifacts"),
            min_recording_bytes: 1024,
            encoder_sample_rate: 16000,
            encoder: "wav".to_string(),
            encoder_shutdown_timeout_secs: 5,
        }
    }
}

impl RecordingConfig {
    pub fn encoder_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptConfig {
    /// Inactivity window before a pending batch is flushed
    pub flush_delay_ms: u64,

    /// Buffered segment count that triggers an immediate flush
    pub max_batch_size: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 500,
            max_batch_size: 16,
        }
    }
}

impl TranscriptConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_BRIDGE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
