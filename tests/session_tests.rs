// Lifecycle tests for the voice session
//
// The session runs against a scripted transport, a recording capture
// backend, and a probing sink factory, so every transition and release
// can be observed without devices or a network.

use anyhow::Result;
use dot_voice::audio::pcm;
use dot_voice::{
    CaptureBackend, CaptureFrame, PlaybackBuffer, PlaybackSink, ScriptHandle, ScriptedTransport,
    ServerContent, SessionStatus, SinkFactory, TransportEvent, VoiceSession, VoiceSessionConfig,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Clone, Default)]
struct CaptureProbe {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    capturing: Arc<AtomicBool>,
}

struct FakeCapture {
    probe: CaptureProbe,
    frames: Vec<CaptureFrame>,
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.capturing.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);
        for frame in self.frames.clone() {
            let _ = tx.try_send(frame);
        }
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.probe.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Clone, Default)]
struct SinkProbe {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    stop_alls: Arc<AtomicUsize>,
    scheduled: Arc<Mutex<Vec<f64>>>,
    /// Keeps completion senders alive for the lifetime of the probe
    completions: Arc<Mutex<Vec<mpsc::UnboundedSender<u64>>>>,
}

struct ProbeSink(SinkProbe);

impl PlaybackSink for ProbeSink {
    fn clock_time(&self) -> f64 {
        0.0
    }

    fn start(&mut self, _id: u64, _buffer: &PlaybackBuffer, start_at: f64) -> Result<()> {
        self.0.scheduled.lock().unwrap().push(start_at);
        Ok(())
    }

    fn stop_all(&mut self) {
        self.0.stop_alls.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct ProbeSinkFactory(SinkProbe);

impl SinkFactory for ProbeSinkFactory {
    fn create(&self) -> Result<(Box<dyn PlaybackSink>, mpsc::UnboundedReceiver<u64>)> {
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.completions.lock().unwrap().push(tx);
        Ok((Box::new(ProbeSink(self.0.clone())), rx))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn frame_of(samples: Vec<f32>) -> CaptureFrame {
    CaptureFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}

fn audio_chunk(duration_secs: f64) -> String {
    let frames = (duration_secs * 24000.0) as usize;
    pcm::encode_base64(&pcm::encode_pcm(&vec![0.0; frames]))
}

fn make_session(
    transport: ScriptedTransport,
    frames: Vec<CaptureFrame>,
) -> (VoiceSession, CaptureProbe, SinkProbe) {
    let capture_probe = CaptureProbe::default();
    let sink_probe = SinkProbe::default();

    let session = VoiceSession::new(
        VoiceSessionConfig {
            session_id: "test-session".to_string(),
            ..Default::default()
        },
        Arc::new(transport),
        Box::new(FakeCapture {
            probe: capture_probe.clone(),
            frames,
        }),
        Box::new(ProbeSinkFactory(sink_probe.clone())),
    );

    (session, capture_probe, sink_probe)
}

async fn wait_for_status(session: &VoiceSession, expected: SessionStatus) {
    for _ in 0..200 {
        if session.status().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for status {:?}, currently {:?}",
        expected,
        session.status().await
    );
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for condition");
}

async fn message(script: &ScriptHandle, content: ServerContent) {
    assert!(script.push(TransportEvent::Message(content)).await);
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_open_transitions_to_listening_and_audio_flows() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, _capture, _sink) = make_session(
        transport,
        vec![frame_of(vec![0.5; 4096]), frame_of(vec![-0.5; 4096])],
    );

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    let probe = script.clone();
    wait_until(move || probe.sent_frames().len() == 2).await;

    let sent = script.sent_frames();
    assert_eq!(sent[0].mime_type, "audio/pcm;rate=16000");

    // 0.5 encodes to 16384 throughout the first block
    let bytes = pcm::decode_base64(&sent[0].data).unwrap();
    let samples = pcm::le_bytes_to_samples(&bytes);
    assert_eq!(samples.len(), 4096);
    assert!(samples.iter().all(|&s| s == 16384));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_from_listening_releases_everything() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, capture, sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    let stats = session.stop().await.unwrap();

    assert_eq!(stats.status, SessionStatus::Idle);
    assert_eq!(session.status().await, SessionStatus::Idle);

    // Open count == close count on every device
    assert_eq!(capture.starts.load(Ordering::SeqCst), 1);
    assert_eq!(capture.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.opens.load(Ordering::SeqCst), 1);
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(script.close_count(), 1);
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, _capture, _sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    assert!(session.start().await.is_err());
    assert_eq!(script.connect_count(), 1);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_enters_error_and_releases_capture() {
    let (transport, _script) = ScriptedTransport::failing("agent unreachable");
    let (session, capture, _sink) = make_session(transport, Vec::new());

    assert!(session.start().await.is_err());
    assert_eq!(session.status().await, SessionStatus::Error);

    let stats = session.stats().await;
    assert!(!stats.status_message.is_empty());

    // The partially acquired input device was released
    assert_eq!(capture.starts.load(Ordering::SeqCst), 1);
    assert_eq!(capture.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_recovers_from_error_state() {
    let (transport, _script) = ScriptedTransport::failing("agent unreachable");
    let (session, _capture, _sink) = make_session(transport, Vec::new());

    assert!(session.start().await.is_err());
    assert_eq!(session.status().await, SessionStatus::Error);

    // A new start acknowledges the error; it fails again here, but the
    // attempt itself is accepted rather than rejected as double-start
    assert!(session.start().await.is_err());
}

#[tokio::test]
async fn test_interruption_clears_playback_but_keeps_listening() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, _capture, sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    message(
        &script,
        ServerContent {
            audio: Some(audio_chunk(0.5)),
            ..Default::default()
        },
    )
    .await;

    let probe = sink.clone();
    wait_until(move || probe.scheduled.lock().unwrap().len() == 1).await;

    assert!(script.push(TransportEvent::Interrupted).await);
    let probe = sink.clone();
    wait_until(move || probe.stop_alls.load(Ordering::SeqCst) >= 1).await;

    // The session is still live; a following chunk schedules normally
    assert_eq!(session.status().await, SessionStatus::Listening);

    message(
        &script,
        ServerContent {
            audio: Some(audio_chunk(0.5)),
            ..Default::default()
        },
    )
    .await;

    let probe = sink.clone();
    wait_until(move || probe.scheduled.lock().unwrap().len() == 2).await;

    let stats = session.stats().await;
    assert_eq!(stats.chunks_played, 2);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_transcript_accumulates_space_joined() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, _capture, _sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    for fragment in ["Hello", "there,", "student."] {
        message(
            &script,
            ServerContent {
                transcription: Some(fragment.to_string()),
                ..Default::default()
            },
        )
        .await;
    }

    for _ in 0..200 {
        if session.stats().await.transcript_fragments == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(session.transcript().await, "Hello there, student.");

    // Stop clears the transcript
    session.stop().await.unwrap();
    assert_eq!(session.transcript().await, "");
}

#[tokio::test]
async fn test_remote_close_returns_to_idle_with_full_teardown() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, capture, sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    assert!(script.push(TransportEvent::Closed).await);
    wait_for_status(&session, SessionStatus::Idle).await;

    assert_eq!(capture.stops.load(Ordering::SeqCst), 1);
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    assert_eq!(script.close_count(), 1);
}

#[tokio::test]
async fn test_transport_error_enters_error_with_teardown() {
    let (transport, script) = ScriptedTransport::opening();
    let (session, capture, sink) = make_session(transport, Vec::new());

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    assert!(script
        .push(TransportEvent::Error("overloaded".to_string()))
        .await);
    wait_for_status(&session, SessionStatus::Error).await;

    let probe = capture.clone();
    wait_until(move || probe.stops.load(Ordering::SeqCst) == 1).await;
    let probe = sink.clone();
    wait_until(move || probe.closes.load(Ordering::SeqCst) == 1).await;

    let stats = session.stats().await;
    assert!(stats.status_message.contains("overloaded"));
}

#[tokio::test]
async fn test_connect_config_carries_persona_and_modality() {
    let (transport, script) = ScriptedTransport::opening();

    let session = VoiceSession::new(
        VoiceSessionConfig {
            session_id: "persona-test".to_string(),
            system_instruction: Some("Keep answers brief.".to_string()),
            voice: "aria".to_string(),
            ..Default::default()
        },
        Arc::new(transport),
        Box::new(FakeCapture {
            probe: CaptureProbe::default(),
            frames: Vec::new(),
        }),
        Box::new(ProbeSinkFactory(SinkProbe::default())),
    );

    session.start().await.unwrap();
    wait_for_status(&session, SessionStatus::Listening).await;

    let config = script.connected_with().unwrap();
    assert!(config.output_audio_transcription);
    assert_eq!(config.voice, "aria");
    assert_eq!(
        config.system_instruction.as_deref(),
        Some("Keep answers brief.")
    );
    assert_eq!(config.response_modalities.len(), 1);

    session.stop().await.unwrap();
}
