use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-facing session status
///
/// Exactly one status is active at any time. Normal flow is
/// Idle → Connecting → Listening → Idle; failures detour through Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Listening,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Listening => "listening",
            SessionStatus::Error => "error",
        }
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle status
    pub status: SessionStatus,

    /// Short human-readable status line
    pub status_message: String,

    /// When the session last started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio frames sent to the agent
    pub frames_sent: usize,

    /// Number of inbound chunks scheduled for playback
    pub chunks_played: usize,

    /// Number of transcription fragments received
    pub transcript_fragments: usize,
}
