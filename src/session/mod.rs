//! Voice session lifecycle
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Microphone capture and PCM encoding for the live channel
//! - The bidirectional transport conversation
//! - Gapless playback of inbound agent audio, with interruption
//! - Transcript accumulation and session statistics
//!
//! The session is the only component with externally visible state; its
//! status moves Idle → Connecting → Listening → Idle, detouring through
//! Error on any failure.

mod config;
mod session;
mod stats;

pub use config::VoiceSessionConfig;
pub use session::VoiceSession;
pub use stats::{SessionStats, SessionStatus};
