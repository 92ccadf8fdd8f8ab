use crate::config::Config;
use crate::session::VoiceSession;
use crate::transport::LiveTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration (session defaults come from here)
    pub config: Arc<Config>,

    /// Transport used to open live channels
    pub transport: Arc<dyn LiveTransport>,

    /// Active voice sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<VoiceSession>>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, transport: Arc<dyn LiveTransport>) -> Self {
        Self {
            config,
            transport,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
