pub mod config;
pub mod http;
pub mod recording;
pub mod relay;
pub mod store;
pub mod transcript;
pub mod transport;

pub use config::Config;
pub use http::{create_router, AppState};
pub use recording::{EncoderFactory, Recorder, RecordingArtifact, WavEncoderFactory};
pub use relay::{
    BackendCommand, BackendEvent, CallFrame, CallSession, InterruptionArbiter, RelayContext,
    SessionEvent, SessionHandle, SessionRegistry,
};
pub use store::{MemoryStore, ObjectStore, SessionRecord, SessionStatus, SessionStore};
pub use transcript::{Speaker, TranscriptBatcher, TranscriptSegment};
