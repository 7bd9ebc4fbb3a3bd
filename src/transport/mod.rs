pub mod backend;
pub mod call;
pub mod protocol;

pub use backend::BackendHandle;
pub use call::{AudioPayload, CallEnvelope, InboundCallFrame};
pub use protocol::{ClientMessage, ServerMessage, SessionParams};
