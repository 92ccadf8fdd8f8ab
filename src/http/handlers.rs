use super::state::AppState;
use crate::audio::capture::CaptureSource;
use crate::session::{SessionStats, VoiceSession, VoiceSessionConfig};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Override the configured persona instruction
    pub system_instruction: Option<String>,

    /// Capture from a WAV file instead of the microphone
    pub source_file: Option<String>,

    /// Enable the WAV tap for this session
    pub record: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub transcript: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/start
/// Start a new voice session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("voice-{}", uuid::Uuid::new_v4()));

    info!("Starting voice session: {}", session_id);

    // Check if already live
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already running", session_id),
                }),
            )
                .into_response();
        }
    }

    let cfg = &state.config;
    let session_config = VoiceSessionConfig {
        session_id: session_id.clone(),
        capture_rate: cfg.audio.capture_rate,
        playback_rate: cfg.audio.playback_rate,
        channels: cfg.audio.channels,
        block_size: cfg.audio.block_size,
        model: cfg.agent.model.clone(),
        voice: cfg.agent.voice.clone(),
        system_instruction: req
            .system_instruction
            .or_else(|| cfg.agent.system_instruction.clone()),
        record_dir: if req.record.unwrap_or(cfg.recording.enabled) {
            Some(PathBuf::from(&cfg.recording.path))
        } else {
            None
        },
        record_chunk_secs: cfg.recording.chunk_duration_secs,
    };

    let source = match req.source_file {
        Some(path) => CaptureSource::File(PathBuf::from(path)),
        None => CaptureSource::Microphone,
    };

    let session =
        match VoiceSession::with_source(session_config, Arc::clone(&state.transport), source) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!("Failed to create session: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to create session: {}", e),
                    }),
                )
                    .into_response();
            }
        };

    if let Err(e) = session.start().await {
        error!("Failed to start session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start session: {}", e),
            }),
        )
            .into_response();
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), session);
    }

    info!("Voice session started successfully: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "connecting".to_string(),
            message: format!("Voice session {} started", session_id),
        }),
    )
        .into_response()
}

/// POST /voice/stop/:session_id
/// Stop a voice session
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping voice session: {}", session_id);

    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match session {
        Some(session) => match session.stop().await {
            Ok(stats) => {
                info!("Voice session stopped successfully: {}", session_id);
                (
                    StatusCode::OK,
                    Json(StopSessionResponse {
                        session_id: session_id.clone(),
                        status: "stopped".to_string(),
                        message: "Voice session stopped".to_string(),
                        stats,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Failed to stop session: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to stop session: {}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => {
            error!("Session {} not found", session_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Session {} not found", session_id),
                }),
            )
                .into_response()
        }
    }
}

/// GET /voice/:session_id/status
/// Get status of a voice session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.stats().await)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /voice/:session_id/transcript
/// Get the transcript accumulated so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                session_id: session_id.clone(),
                transcript: session.transcript().await,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
