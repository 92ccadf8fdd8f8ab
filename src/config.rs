use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub agent: AgentConfig,
    pub transport: TransportConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub capture_rate: u32,
    pub playback_rate: u32,
    pub channels: u16,
    pub block_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    pub nats_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub path: String,
    pub chunk_duration_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
