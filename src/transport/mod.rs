//! Session transport abstraction
//!
//! The live conversation channel is modeled as a trait so the session
//! lifecycle and playback scheduler can be driven by a scripted fake in
//! tests. `NatsTransport` is the wired implementation; events always
//! arrive in publication order, sends are best-effort with no ack.

pub mod messages;
pub mod nats;
pub mod scripted;

pub use messages::{RealtimeInputMessage, ServerEventMessage, SessionOpenMessage};
pub use nats::NatsTransport;
pub use scripted::{ScriptHandle, ScriptedTransport};

use anyhow::Result;
use tokio::sync::mpsc;

/// Configuration for opening a conversation
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Model identifier of the remote agent
    pub model: String,
    /// Requested response modalities
    pub response_modalities: Vec<ResponseModality>,
    /// Ask the agent to stream transcription of its own speech
    pub output_audio_transcription: bool,
    /// Voice identity
    pub voice: String,
    /// Optional persona instruction
    pub system_instruction: Option<String>,
}

/// Response modality requested from the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Audio,
    Text,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "audio",
            ResponseModality::Text => "text",
        }
    }
}

/// An outbound audio frame ready for the wire
#[derive(Debug, Clone)]
pub struct RealtimeAudio {
    /// Base64-encoded little-endian 16-bit PCM
    pub data: String,
    /// MIME tag with explicit sample rate
    pub mime_type: String,
}

/// Payload of a `TransportEvent::Message`
#[derive(Debug, Clone, Default)]
pub struct ServerContent {
    /// Transcription fragment of the agent's speech
    pub transcription: Option<String>,
    /// Base64-encoded audio chunk at the playback rate
    pub audio: Option<String>,
}

/// Events delivered by the live channel, in arrival order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The remote side signalled the channel is open; audio may flow
    Open,
    /// A payload message
    Message(ServerContent),
    /// The user spoke over the agent; stop playback immediately
    Interrupted,
    /// Mid-session failure
    Error(String),
    /// The channel closed
    Closed,
}

/// The live bidirectional conversation
///
/// At most one handle is alive per voice session. Sends are best-effort
/// fire-and-forget; `close` is idempotent and never fails when the channel
/// is already gone.
#[async_trait::async_trait]
pub trait SessionHandle: Send + Sync {
    /// Send one audio frame; may be called many times per second
    async fn send_realtime_input(&self, frame: RealtimeAudio) -> Result<()>;

    /// Terminate the channel
    async fn close(&self);
}

/// Opens live conversations
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a channel for one conversation
    ///
    /// Resolves once the channel is usable. Audio must still not be sent
    /// before `TransportEvent::Open` arrives on the receiver.
    async fn connect(
        &self,
        session_id: &str,
        config: ConnectConfig,
    ) -> Result<(Box<dyn SessionHandle>, mpsc::Receiver<TransportEvent>)>;
}
