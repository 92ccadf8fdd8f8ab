use crate::error::VoiceError;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A block of float samples captured from the input source
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Samples in [-1.0, 1.0], interleaved when channels > 1
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (the realtime agent expects 16kHz input)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Samples per emitted block
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            block_size: 4096,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: device input via cpal (behind the `microphone` feature)
/// - File: WAV file replayed at real time (tests, batch runs, headless hosts)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Begin capturing audio
    ///
    /// Returns a channel receiver that will receive capture frames
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>>;

    /// Stop capturing and release the input source; idempotent
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default audio input device
    Microphone,
    /// WAV file replayed at real time
    File(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>> {
        match source {
            CaptureSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneCapture;
                    Ok(Box::new(MicrophoneCapture::new(config)))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    Err(VoiceError::UnsupportedEnvironment(
                        "built without the microphone feature".to_string(),
                    )
                    .into())
                }
            }

            CaptureSource::File(path) => Ok(Box::new(FileCapture::new(path, config))),
        }
    }
}

/// Capture backend that replays a WAV file at real time
///
/// Emits `block_size`-sample frames paced at the file's playback rate, so
/// downstream behaves exactly as it would with a live input device.
pub struct FileCapture {
    path: PathBuf,
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        if self.is_capturing() {
            anyhow::bail!("file capture already started");
        }

        let reader = hound::WavReader::open(&self.path)
            .with_context(|| format!("Failed to open WAV file: {:?}", self.path))?;
        let spec = reader.spec();

        if spec.sample_rate != self.config.sample_rate || spec.channels != self.config.channels {
            return Err(VoiceError::DeviceUnavailable(format!(
                "fixture is {}Hz {}ch, capture expects {}Hz {}ch",
                spec.sample_rate, spec.channels, self.config.sample_rate, self.config.channels
            ))
            .into());
        }

        let samples: Vec<f32> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?
            .into_iter()
            .map(super::pcm::sample_to_f32)
            .collect();

        info!(
            "File capture started: {:?} ({} samples @ {}Hz)",
            self.path,
            samples.len(),
            spec.sample_rate
        );

        let (tx, rx) = mpsc::channel(32);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let task = tokio::spawn(async move {
            let block_secs = config.block_size as f64
                / (config.sample_rate as f64 * config.channels as f64);
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs_f64(block_secs));
            let mut sent: u64 = 0;

            for block in samples.chunks(config.block_size * config.channels as usize) {
                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = CaptureFrame {
                    samples: block.to_vec(),
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms: sent * 1000
                        / (config.sample_rate as u64 * config.channels as u64),
                };
                sent += block.len() as u64;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File capture finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("File capture task panicked: {}", e);
            }
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
