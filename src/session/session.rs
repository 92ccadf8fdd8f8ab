use super::config::VoiceSessionConfig;
use super::stats::{SessionStats, SessionStatus};
use crate::audio::capture::{
    CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureFrame, CaptureSource,
};
use crate::audio::pcm;
use crate::audio::playback::{NullSinkFactory, PlaybackConfig, PlaybackScheduler, SinkFactory};
use crate::audio::recorder::{RecorderConfig, RecorderSide, SessionRecorder};
use crate::transport::{
    ConnectConfig, LiveTransport, RealtimeAudio, ResponseModality, SessionHandle, TransportEvent,
};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct StatusInner {
    status: SessionStatus,
    message: String,
    started_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Transcript {
    text: String,
    fragments: usize,
}

/// A realtime voice session managing one bidirectional conversation
///
/// Owns the capture backend, the playback sink, and the live channel for
/// exactly one conversation at a time. All devices are acquired in
/// `start()` and released on every exit path (explicit stop, remote close,
/// transport error), so repeated start/stop cycles cannot leak.
pub struct VoiceSession {
    config: VoiceSessionConfig,
    transport: Arc<dyn LiveTransport>,

    /// Input device; acquired on start, released on teardown
    capture: Arc<Mutex<Box<dyn CaptureBackend>>>,

    /// Creates the output sink for each start
    sinks: Box<dyn SinkFactory>,

    /// The single externally visible state of the session
    status: Arc<RwLock<StatusInner>>,

    /// Space-joined transcription of the agent's speech
    transcript: Arc<Mutex<Transcript>>,

    /// Teardown guard; resources are released exactly once per start
    active: Arc<AtomicBool>,

    frames_sent: Arc<AtomicUsize>,
    chunks_played: Arc<AtomicUsize>,

    /// Live channel handle; at most one per session
    handle: Arc<Mutex<Option<Arc<dyn SessionHandle>>>>,

    shutdown: Mutex<Option<broadcast::Sender<()>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    capture_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl VoiceSession {
    /// Create a session from explicit parts
    ///
    /// This is the seam the tests use: a scripted transport, a recording
    /// capture backend, and a fake sink factory slot in here.
    pub fn new(
        config: VoiceSessionConfig,
        transport: Arc<dyn LiveTransport>,
        capture: Box<dyn CaptureBackend>,
        sinks: Box<dyn SinkFactory>,
    ) -> Self {
        Self {
            config,
            transport,
            capture: Arc::new(Mutex::new(capture)),
            sinks,
            status: Arc::new(RwLock::new(StatusInner {
                status: SessionStatus::Idle,
                message: "Tap to start conversation".to_string(),
                started_at: Utc::now(),
            })),
            transcript: Arc::new(Mutex::new(Transcript::default())),
            active: Arc::new(AtomicBool::new(false)),
            frames_sent: Arc::new(AtomicUsize::new(0)),
            chunks_played: Arc::new(AtomicUsize::new(0)),
            handle: Arc::new(Mutex::new(None)),
            shutdown: Mutex::new(None),
            event_task: Mutex::new(None),
            capture_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a session capturing from the given source, with the default
    /// playback sink
    pub fn with_source(
        config: VoiceSessionConfig,
        transport: Arc<dyn LiveTransport>,
        source: CaptureSource,
    ) -> Result<Self> {
        let capture = CaptureBackendFactory::create(
            source,
            CaptureConfig {
                sample_rate: config.capture_rate,
                channels: config.channels,
                block_size: config.block_size,
            },
        )?;

        Ok(Self::new(config, transport, capture, Box::new(NullSinkFactory)))
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Start the conversation
    ///
    /// Valid from `Idle` (or `Error`, which a new start acknowledges);
    /// rejected otherwise, so a double start can never open two live
    /// channels. Audio begins flowing only once the remote side signals
    /// the channel is open.
    pub async fn start(&self) -> Result<()> {
        {
            let mut st = self.status.write().await;
            match st.status {
                SessionStatus::Idle | SessionStatus::Error => {}
                _ => anyhow::bail!(
                    "voice session {} is already running",
                    self.config.session_id
                ),
            }
            st.status = SessionStatus::Connecting;
            st.message = "Initializing session...".to_string();
            st.started_at = Utc::now();
        }

        {
            let mut t = self.transcript.lock().await;
            t.text.clear();
            t.fragments = 0;
        }
        self.frames_sent.store(0, Ordering::SeqCst);
        self.chunks_played.store(0, Ordering::SeqCst);

        info!("Starting voice session: {}", self.config.session_id);

        // WAV taps touch only the filesystem; create them before any
        // device is acquired so a failure here has nothing to release
        let mut mic_tap = None;
        let mut agent_tap = None;
        if let Some(dir) = &self.config.record_dir {
            let tap = |side, sample_rate| {
                SessionRecorder::new(RecorderConfig {
                    chunk_duration_secs: self.config.record_chunk_secs,
                    output_dir: dir.clone(),
                    session_id: self.config.session_id.clone(),
                    side,
                    sample_rate,
                    channels: self.config.channels,
                })
            };

            mic_tap = match tap(RecorderSide::Capture, self.config.capture_rate) {
                Ok(tap) => Some(tap),
                Err(e) => {
                    self.enter_error(format!("{:#}", e)).await;
                    return Err(e);
                }
            };
            agent_tap = match tap(RecorderSide::Playback, self.config.playback_rate) {
                Ok(tap) => Some(tap),
                Err(e) => {
                    self.enter_error(format!("{:#}", e)).await;
                    return Err(e);
                }
            };
        }

        // Acquire the input device
        let frames_rx = {
            let mut backend = self.capture.lock().await;
            match backend.start().await {
                Ok(rx) => rx,
                Err(e) => {
                    self.enter_error(format!("{:#}", e)).await;
                    return Err(e);
                }
            }
        };

        // Acquire the output sink
        let (sink, completions) = match self.sinks.create() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = self.capture.lock().await.stop().await;
                self.enter_error(format!("{:#}", e)).await;
                return Err(e);
            }
        };

        let mut scheduler = PlaybackScheduler::new(
            PlaybackConfig {
                sample_rate: self.config.playback_rate,
                channels: self.config.channels,
            },
            sink,
            completions,
        );

        // Open the live channel
        let connect = ConnectConfig {
            model: self.config.model.clone(),
            response_modalities: vec![ResponseModality::Audio],
            output_audio_transcription: true,
            voice: self.config.voice.clone(),
            system_instruction: self.config.system_instruction.clone(),
        };

        let (handle, events_rx) = match self
            .transport
            .connect(&self.config.session_id, connect)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                let _ = self.capture.lock().await.stop().await;
                scheduler.shutdown();
                self.enter_error(format!("{:#}", e)).await;
                return Err(e);
            }
        };

        let handle: Arc<dyn SessionHandle> = Arc::from(handle);
        *self.handle.lock().await = Some(Arc::clone(&handle));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        *self.shutdown.lock().await = Some(shutdown_tx.clone());
        self.active.store(true, Ordering::SeqCst);

        let status = Arc::clone(&self.status);
        let transcript = Arc::clone(&self.transcript);
        let frames_sent = Arc::clone(&self.frames_sent);
        let chunks_played = Arc::clone(&self.chunks_played);
        let active = Arc::clone(&self.active);
        let capture = Arc::clone(&self.capture);
        let handle_slot = Arc::clone(&self.handle);
        let capture_task = Arc::clone(&self.capture_task);
        let session_id = self.config.session_id.clone();

        let task = tokio::spawn(async move {
            info!("Session event task started");

            let mut shutdown_rx = shutdown_rx;
            let mut events_rx = events_rx;
            let mut frames_rx = Some(frames_rx);
            let mut mic_tap = mic_tap;
            let mut agent_tap = agent_tap;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    maybe = events_rx.recv() => match maybe {
                        None => break,
                        Some(TransportEvent::Open) => {
                            {
                                let mut st = status.write().await;
                                st.status = SessionStatus::Listening;
                                st.message = "Listening...".to_string();
                            }
                            info!("Live channel open for session {}", session_id);

                            if let Some(rx) = frames_rx.take() {
                                let task = tokio::spawn(capture_loop(
                                    rx,
                                    Arc::clone(&handle),
                                    Arc::clone(&frames_sent),
                                    shutdown_tx.subscribe(),
                                    mic_tap.take(),
                                ));
                                *capture_task.lock().await = Some(task);
                            }
                        }
                        Some(TransportEvent::Message(content)) => {
                            if let Some(fragment) = content.transcription {
                                let mut t = transcript.lock().await;
                                if !t.text.is_empty() {
                                    t.text.push(' ');
                                }
                                t.text.push_str(&fragment);
                                t.fragments += 1;
                            }

                            if let Some(audio) = content.audio {
                                match pcm::decode_base64(&audio) {
                                    Ok(bytes) => {
                                        if let Some(tap) = agent_tap.as_mut() {
                                            let samples = pcm::le_bytes_to_samples(&bytes);
                                            if let Err(e) = tap.write_samples(&samples) {
                                                warn!("Failed to record agent audio: {}", e);
                                            }
                                        }

                                        match scheduler.enqueue_bytes(&bytes) {
                                            Ok(_) => {
                                                chunks_played.fetch_add(1, Ordering::SeqCst);
                                            }
                                            Err(e) => {
                                                warn!("Failed to schedule inbound audio: {}", e)
                                            }
                                        }
                                    }
                                    Err(e) => warn!("Failed to decode inbound audio: {}", e),
                                }
                            }
                        }
                        Some(TransportEvent::Interrupted) => scheduler.interrupt(),
                        Some(TransportEvent::Error(message)) => {
                            error!("Transport error in session {}: {}", session_id, message);
                            let mut st = status.write().await;
                            st.status = SessionStatus::Error;
                            st.message = format!("Connection error: {}", message);
                            break;
                        }
                        Some(TransportEvent::Closed) => {
                            info!("Live channel closed by remote");
                            break;
                        }
                    }
                }
            }

            // Exit path, shared by stop, remote close, and error: stop all
            // playback, finalize taps, then release devices exactly once
            scheduler.shutdown();

            if let Some(tap) = agent_tap.take() {
                if let Err(e) = tap.finish() {
                    warn!("Failed to finalize agent tap: {}", e);
                }
            }
            if let Some(tap) = mic_tap.take() {
                if let Err(e) = tap.finish() {
                    warn!("Failed to finalize capture tap: {}", e);
                }
            }

            Self::teardown(&active, &capture, &handle_slot).await;

            {
                let mut st = status.write().await;
                if matches!(
                    st.status,
                    SessionStatus::Connecting | SessionStatus::Listening
                ) {
                    st.status = SessionStatus::Idle;
                    st.message = "Session ended".to_string();
                }
            }

            info!("Session event task stopped");
        });

        *self.event_task.lock().await = Some(task);

        info!("Voice session started: {}", self.config.session_id);

        Ok(())
    }

    /// Stop the conversation and release every resource
    ///
    /// By the time this returns the event task has run its exit path, so
    /// no buffer is still playing and both devices are released.
    pub async fn stop(&self) -> Result<SessionStats> {
        {
            let st = self.status.read().await;
            if !matches!(
                st.status,
                SessionStatus::Connecting | SessionStatus::Listening
            ) {
                warn!("Voice session {} is not active", self.config.session_id);
                return Ok(self.stats().await);
            }
        }

        info!("Stopping voice session: {}", self.config.session_id);

        if let Some(tx) = self.shutdown.lock().await.as_ref() {
            let _ = tx.send(());
        }

        if let Some(task) = self.event_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Event task panicked: {}", e);
            }
        }

        if let Some(task) = self.capture_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }

        Self::teardown(&self.active, &self.capture, &self.handle).await;

        {
            let mut st = self.status.write().await;
            st.status = SessionStatus::Idle;
            st.message = "Tap to start conversation".to_string();
        }

        let stats = self.stats().await;

        {
            let mut t = self.transcript.lock().await;
            t.text.clear();
            t.fragments = 0;
        }

        info!("Voice session stopped: {}", self.config.session_id);

        Ok(stats)
    }

    /// Current lifecycle status
    pub async fn status(&self) -> SessionStatus {
        self.status.read().await.status
    }

    /// Accumulated transcript of the agent's speech
    pub async fn transcript(&self) -> String {
        self.transcript.lock().await.text.clone()
    }

    /// Current session statistics
    pub async fn stats(&self) -> SessionStats {
        let st = self.status.read().await;
        let transcript = self.transcript.lock().await;
        let duration = Utc::now().signed_duration_since(st.started_at);

        SessionStats {
            status: st.status,
            status_message: st.message.clone(),
            started_at: st.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            chunks_played: self.chunks_played.load(Ordering::SeqCst),
            transcript_fragments: transcript.fragments,
        }
    }

    async fn enter_error(&self, message: String) {
        let mut st = self.status.write().await;
        st.status = SessionStatus::Error;
        st.message = message;
    }

    /// Release the input device and the live channel, exactly once
    ///
    /// Reachable from the stop button, a remote close, and a transport
    /// error; the swap on `active` makes the release idempotent.
    async fn teardown(
        active: &AtomicBool,
        capture: &Mutex<Box<dyn CaptureBackend>>,
        handle: &Mutex<Option<Arc<dyn SessionHandle>>>,
    ) {
        if !active.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Releasing voice session resources");

        {
            let mut backend = capture.lock().await;
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop capture backend: {}", e);
            }
        }

        if let Some(handle) = handle.lock().await.take() {
            handle.close().await;
        }
    }
}

/// Forwards capture blocks to the live channel
///
/// Spawned only once the channel reports open. Each block is converted to
/// LE int16, base64-encoded, tagged with the capture rate, and sent
/// fire-and-forget in capture order.
async fn capture_loop(
    mut frames: mpsc::Receiver<CaptureFrame>,
    handle: Arc<dyn SessionHandle>,
    frames_sent: Arc<AtomicUsize>,
    mut shutdown: broadcast::Receiver<()>,
    mut tap: Option<SessionRecorder>,
) {
    info!("Capture forwarding task started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            maybe = frames.recv() => match maybe {
                None => break,
                Some(frame) => {
                    let samples: Vec<i16> =
                        frame.samples.iter().map(|&s| pcm::sample_to_i16(s)).collect();

                    if let Some(tap) = tap.as_mut() {
                        if let Err(e) = tap.write_samples(&samples) {
                            warn!("Failed to record capture audio: {}", e);
                        }
                    }

                    let audio = RealtimeAudio {
                        data: pcm::encode_base64(&pcm::samples_to_le_bytes(&samples)),
                        mime_type: pcm::CAPTURE_MIME_TYPE.to_string(),
                    };

                    if let Err(e) = handle.send_realtime_input(audio).await {
                        error!("Failed to send audio frame: {}", e);
                    } else {
                        frames_sent.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    if let Some(tap) = tap.take() {
        match tap.finish() {
            Ok(chunks) => info!("Capture tap complete: {} chunks", chunks.len()),
            Err(e) => warn!("Failed to finalize capture tap: {}", e),
        }
    }

    info!("Capture forwarding task stopped");
}
