use crate::relay::{RelayContext, SessionRegistry};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session id → event channel handle)
    pub registry: SessionRegistry,

    /// Collaborators handed to every spawned session
    pub relay: RelayContext,
}

impl AppState {
    pub fn new(relay: RelayContext) -> Self {
        Self {
            registry: SessionRegistry::new(),
            relay,
        }
    }
}
