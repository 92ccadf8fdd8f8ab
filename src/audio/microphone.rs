// Device capture via cpal
//
// The cpal stream is !Send, so it lives on a dedicated worker thread for
// the whole capture. The audio callback packs samples into fixed-size
// blocks and hands them over with a non-blocking send; when the consumer
// lags, blocks are dropped rather than buffered (at most one block is ever
// in flight, matching the transport's best-effort contract).

use super::capture::{CaptureBackend, CaptureConfig, CaptureFrame};
use crate::error::VoiceError;
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Capture backend reading the default input device
pub struct MicrophoneCapture {
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        if self.is_capturing() {
            anyhow::bail!("microphone capture already started");
        }

        let (tx, rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), VoiceError>>();

        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let worker = std::thread::spawn(move || {
            run_capture(config, capturing, tx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                Ok(rx)
            }
            Ok(Err(e)) => {
                self.capturing.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e.into())
            }
            Err(_) => {
                self.capturing.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(VoiceError::DeviceUnavailable("capture worker died".to_string()).into())
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn run_capture(
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    tx: mpsc::Sender<CaptureFrame>,
    ready_tx: oneshot::Sender<Result<(), VoiceError>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(
                "no default input device".to_string(),
            )));
            return;
        }
    };

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let block_size = config.block_size * config.channels as usize;
    let sample_rate = config.sample_rate;
    let channels = config.channels;
    let mut pending: Vec<f32> = Vec::with_capacity(block_size);
    let mut emitted: u64 = 0;

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                pending.push(sample);
                if pending.len() == block_size {
                    let frame = CaptureFrame {
                        samples: std::mem::replace(&mut pending, Vec::with_capacity(block_size)),
                        sample_rate,
                        channels,
                        timestamp_ms: emitted * 1000 / (sample_rate as u64 * channels as u64),
                    };
                    emitted += block_size as u64;
                    // Non-blocking: drop the block when the consumer lags
                    let _ = tx.try_send(frame);
                }
            }
        },
        |err| warn!("Microphone stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(map_build_error(e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(e.to_string())));
        return;
    }

    info!("Microphone capture started ({}Hz, {}ch)", sample_rate, channels);
    let _ = ready_tx.send(Ok(()));

    while capturing.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    drop(stream);
    info!("Microphone capture stopped");
}

fn map_build_error(err: cpal::BuildStreamError) -> VoiceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            VoiceError::DeviceUnavailable("input device disappeared".to_string())
        }
        // The OS reports a refused capture grant as a backend error
        cpal::BuildStreamError::BackendSpecific { .. } => VoiceError::PermissionDenied,
        other => VoiceError::DeviceUnavailable(other.to_string()),
    }
}
