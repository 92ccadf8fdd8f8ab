use super::messages::{RealtimeInputMessage, ServerEventMessage, SessionOpenMessage};
use super::{ConnectConfig, LiveTransport, RealtimeAudio, SessionHandle, TransportEvent};
use crate::error::VoiceError;
use anyhow::Result;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Live transport over NATS subjects
///
/// Each conversation gets its own connection and subject pair:
/// `voice.input.session-{id}` carries outbound audio frames, and
/// `voice.event.session-{id}` delivers agent events. The conversation is
/// announced on `voice.session.open` so the agent side can pick it up.
pub struct NatsTransport {
    url: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl LiveTransport for NatsTransport {
    async fn connect(
        &self,
        session_id: &str,
        config: ConnectConfig,
    ) -> Result<(Box<dyn SessionHandle>, mpsc::Receiver<TransportEvent>)> {
        info!("Connecting to NATS at {}", self.url);

        let client = async_nats::connect(&self.url)
            .await
            .map_err(|e| VoiceError::Connect(format!("nats connect failed: {}", e)))?;

        let event_subject = format!("voice.event.session-{}", session_id);
        let mut subscriber = client
            .subscribe(event_subject.clone())
            .await
            .map_err(|e| VoiceError::Connect(format!("subscribe failed: {}", e)))?;

        info!("Subscribed to {}", event_subject);

        // Announce the conversation so the agent side can pick it up
        let open = SessionOpenMessage {
            session_id: session_id.to_string(),
            model: config.model,
            response_modalities: config
                .response_modalities
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            output_audio_transcription: config.output_audio_transcription,
            voice: config.voice,
            system_instruction: config.system_instruction,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        client
            .publish("voice.session.open", serde_json::to_vec(&open)?.into())
            .await
            .map_err(|e| VoiceError::Connect(format!("session announcement failed: {}", e)))?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let expected_session = session_id.to_string();

        let forward_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let event = match serde_json::from_slice::<ServerEventMessage>(&msg.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Failed to parse server event: {}", e);
                        continue;
                    }
                };

                if event.session_id != expected_session {
                    continue;
                }

                let mut ended = false;
                for event in event.into_events() {
                    if matches!(event, TransportEvent::Closed) {
                        ended = true;
                    }
                    if events_tx.send(event).await.is_err() {
                        return;
                    }
                }

                if ended {
                    break;
                }
            }

            // Subscription gone without a close marker: surface it as one
            let _ = events_tx.try_send(TransportEvent::Closed);
        });

        let handle = NatsSessionHandle {
            client,
            session_id: session_id.to_string(),
            input_subject: format!("voice.input.session-{}", session_id),
            closed: AtomicBool::new(false),
            forward_task,
        };

        Ok((Box::new(handle), events_rx))
    }
}

struct NatsSessionHandle {
    client: async_nats::Client,
    session_id: String,
    input_subject: String,
    closed: AtomicBool,
    forward_task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl SessionHandle for NatsSessionHandle {
    async fn send_realtime_input(&self, frame: RealtimeAudio) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Dropping audio frame: channel closed");
            return Ok(());
        }

        let message = RealtimeInputMessage {
            session_id: self.session_id.clone(),
            data: frame.data,
            mime_type: frame.mime_type,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: false,
        };

        self.client
            .publish(self.input_subject.clone(), serde_json::to_vec(&message)?.into())
            .await
            .map_err(|e| VoiceError::Transport(format!("publish failed: {}", e)))?;

        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Closing live channel for session {}", self.session_id);

        // Best-effort final marker for the agent side
        let message = RealtimeInputMessage {
            session_id: self.session_id.clone(),
            data: String::new(),
            mime_type: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: true,
        };

        if let Ok(payload) = serde_json::to_vec(&message) {
            if let Err(e) = self
                .client
                .publish(self.input_subject.clone(), payload.into())
                .await
            {
                warn!("Failed to publish final frame: {}", e);
            }
        }

        self.forward_task.abort();
    }
}
