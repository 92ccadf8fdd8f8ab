pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureFrame, CaptureSource,
    NullSink, NullSinkFactory, PlaybackBuffer, PlaybackConfig, PlaybackScheduler, PlaybackSink,
    SessionRecorder, SinkFactory,
};
pub use chat::{ChatBackend, ChatConfig, ChatEvent, ChatMessage, ChatReply, ChatRole, GroundingLink, ReplyAccumulator};
pub use config::Config;
pub use error::VoiceError;
pub use http::{create_router, AppState};
pub use session::{SessionStats, SessionStatus, VoiceSession, VoiceSessionConfig};
pub use transport::{
    ConnectConfig, LiveTransport, NatsTransport, RealtimeAudio, ResponseModality, ScriptHandle,
    ScriptedTransport, ServerContent, SessionHandle, TransportEvent,
};
