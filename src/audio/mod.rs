pub mod capture;
pub mod pcm;
pub mod playback;
pub mod recorder;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use capture::{
    CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureFrame, CaptureSource, FileCapture,
};
pub use playback::{
    NullSink, NullSinkFactory, PlaybackBuffer, PlaybackConfig, PlaybackScheduler, PlaybackSink,
    SinkFactory,
};
pub use recorder::{ChunkMetadata, RecorderConfig, RecorderSide, SessionRecorder};
