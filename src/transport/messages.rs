use super::{ServerContent, TransportEvent};
use serde::{Deserialize, Serialize};

/// Outbound realtime audio frame published on the input subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeInputMessage {
    pub session_id: String,
    /// Base64-encoded little-endian 16-bit PCM
    pub data: String,
    /// e.g. "audio/pcm;rate=16000"
    pub mime_type: String,
    /// RFC3339 timestamp
    pub timestamp: String,
    /// Marks the last frame of the conversation
    #[serde(rename = "final", default)]
    pub final_frame: bool,
}

/// Conversation announcement published when a session opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpenMessage {
    pub session_id: String,
    /// Model identifier of the remote agent
    pub model: String,
    /// Requested response modalities ("audio", "text")
    pub response_modalities: Vec<String>,
    /// Ask the agent to stream transcription of its own speech
    pub output_audio_transcription: bool,
    /// Voice identity
    pub voice: String,
    /// Optional persona instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// RFC3339 timestamp
    pub timestamp: String,
}

/// Inbound event envelope from the agent side
///
/// A single envelope may carry a payload plus lifecycle flags; it expands
/// into transport events in a fixed order (open, payload, interrupted,
/// error, close) so payloads are never processed after a close.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEventMessage {
    pub session_id: String,
    /// The channel is open; audio may flow
    #[serde(default)]
    pub open: bool,
    /// Transcription fragment of the agent's speech, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    /// Base64-encoded LE 16-bit PCM at the playback rate, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// The user spoke over the agent; playback must stop now
    #[serde(default)]
    pub interrupted: bool,
    /// Mid-session failure reported by the agent side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The agent side ended the conversation
    #[serde(rename = "final", default)]
    pub closed: bool,
}

impl ServerEventMessage {
    /// Expand the envelope into the transport events it carries
    pub fn into_events(self) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        if self.open {
            events.push(TransportEvent::Open);
        }

        if self.transcription.is_some() || self.audio.is_some() {
            events.push(TransportEvent::Message(ServerContent {
                transcription: self.transcription,
                audio: self.audio,
            }));
        }

        if self.interrupted {
            events.push(TransportEvent::Interrupted);
        }

        if let Some(error) = self.error {
            events.push(TransportEvent::Error(error));
        }

        if self.closed {
            events.push(TransportEvent::Closed);
        }

        events
    }
}
