pub mod arbiter;
pub mod event;
pub mod registry;
pub mod session;

pub use arbiter::InterruptionArbiter;
pub use event::{
    AudioChunk, AudioOrigin, BackendCommand, BackendEvent, CallFrame, SessionEvent,
};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::CallSession;

use crate::config::Config;
use crate::recording::EncoderFactory;
use crate::store::{ObjectStore, SessionStore};
use std::sync::Arc;

/// Shared collaborators injected into every session
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub encoders: Arc<dyn EncoderFactory>,
}
