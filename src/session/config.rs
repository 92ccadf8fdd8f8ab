use crate::audio::pcm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSessionConfig {
    /// Unique session identifier (e.g., "voice-7b9e…")
    pub session_id: String,

    /// Input sample rate (the agent expects 16kHz)
    pub capture_rate: u32,

    /// Output sample rate (the agent speaks at 24kHz)
    pub playback_rate: u32,

    /// Number of audio channels on both paths (1 = mono)
    pub channels: u16,

    /// Samples per capture block
    pub block_size: usize,

    /// Remote agent model identifier
    pub model: String,

    /// Voice identity for the agent's speech
    pub voice: String,

    /// Optional persona instruction for the conversation
    pub system_instruction: Option<String>,

    /// Directory for the optional WAV tap; None disables recording
    pub record_dir: Option<PathBuf>,

    /// Duration of each WAV tap chunk before rotating files
    pub record_chunk_secs: u64,
}

impl Default for VoiceSessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            capture_rate: pcm::CAPTURE_SAMPLE_RATE,
            playback_rate: pcm::PLAYBACK_SAMPLE_RATE,
            channels: 1,
            block_size: 4096,
            model: "native-audio-v1".to_string(),
            voice: "aria".to_string(),
            system_instruction: None,
            record_dir: None,
            record_chunk_secs: 300,
        }
    }
}
