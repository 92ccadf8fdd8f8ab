use thiserror::Error;

/// Failures surfaced by the realtime voice pipeline.
///
/// Every variant is caught at the session lifecycle boundary, mapped to the
/// `Error` status with a short human-readable message, and shown to the
/// user. None of them crash the host process, and no automatic retry is
/// attempted: recovery requires an explicit `start()`.
#[derive(Error, Debug, Clone)]
pub enum VoiceError {
    /// Microphone access was refused by the user or the environment
    #[error("microphone access denied")]
    PermissionDenied,

    /// No usable audio device for the requested direction
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The transport channel failed to open
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Mid-session failure reported by the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// The host has no audio capability for the requested source
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),
}
