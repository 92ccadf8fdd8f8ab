use super::{ConnectConfig, LiveTransport, RealtimeAudio, SessionHandle, TransportEvent};
use crate::error::VoiceError;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// In-memory transport that replays scripted events
///
/// The testability seam for the whole voice core: the session lifecycle
/// and playback scheduler run against this fake while tests push events
/// through the [`ScriptHandle`] and inspect what was sent.
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

/// Test-side controller for a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<ScriptState>,
}

struct ScriptState {
    /// Events queued before connect; replayed right after it resolves
    preamble: Mutex<Vec<TransportEvent>>,
    /// Error message returned by `connect`, when scripted to fail
    connect_failure: Mutex<Option<String>>,
    /// Live event sender, present while a conversation is open
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    /// Frames the session sent over the channel
    sent: Mutex<Vec<RealtimeAudio>>,
    /// Config the session connected with
    connected_with: Mutex<Option<ConnectConfig>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedTransport {
    /// Transport that emits the given events immediately after connect
    pub fn new(preamble: Vec<TransportEvent>) -> (Self, ScriptHandle) {
        Self::build(preamble, None)
    }

    /// Transport that opens the channel as soon as the session connects
    pub fn opening() -> (Self, ScriptHandle) {
        Self::new(vec![TransportEvent::Open])
    }

    /// Transport whose `connect` fails with the given message
    pub fn failing(message: impl Into<String>) -> (Self, ScriptHandle) {
        Self::build(Vec::new(), Some(message.into()))
    }

    fn build(preamble: Vec<TransportEvent>, failure: Option<String>) -> (Self, ScriptHandle) {
        let state = Arc::new(ScriptState {
            preamble: Mutex::new(preamble),
            connect_failure: Mutex::new(failure),
            events: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            connected_with: Mutex::new(None),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });

        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

impl ScriptHandle {
    /// Deliver one event to the session; false when no conversation is open
    pub async fn push(&self, event: TransportEvent) -> bool {
        let sender = self.state.events.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => {
                warn!("Scripted event dropped: no open conversation");
                false
            }
        }
    }

    /// Frames sent by the session so far
    pub fn sent_frames(&self) -> Vec<RealtimeAudio> {
        self.state.sent.lock().unwrap().clone()
    }

    /// Config the last conversation connected with
    pub fn connected_with(&self) -> Option<ConnectConfig> {
        self.state.connected_with.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LiveTransport for ScriptedTransport {
    async fn connect(
        &self,
        _session_id: &str,
        config: ConnectConfig,
    ) -> Result<(Box<dyn SessionHandle>, mpsc::Receiver<TransportEvent>)> {
        if let Some(message) = self.state.connect_failure.lock().unwrap().clone() {
            return Err(VoiceError::Connect(message).into());
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.connected_with.lock().unwrap() = Some(config);

        let (tx, rx) = mpsc::channel(64);
        let preamble: Vec<TransportEvent> =
            self.state.preamble.lock().unwrap().drain(..).collect();
        for event in preamble {
            let _ = tx.send(event).await;
        }
        *self.state.events.lock().unwrap() = Some(tx);

        let handle = ScriptedSessionHandle {
            state: Arc::clone(&self.state),
        };

        Ok((Box::new(handle), rx))
    }
}

struct ScriptedSessionHandle {
    state: Arc<ScriptState>,
}

#[async_trait::async_trait]
impl SessionHandle for ScriptedSessionHandle {
    async fn send_realtime_input(&self, frame: RealtimeAudio) -> Result<()> {
        self.state.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.events.lock().unwrap().take();
    }
}
