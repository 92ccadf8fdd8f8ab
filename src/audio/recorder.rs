use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which side of the conversation a recorder taps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderSide {
    /// Outbound microphone audio
    Capture,
    /// Inbound agent audio
    Playback,
}

impl RecorderSide {
    fn label(&self) -> &'static str {
        match self {
            RecorderSide::Capture => "mic",
            RecorderSide::Playback => "agent",
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Duration of each chunk in seconds before rotating files
    pub chunk_duration_secs: u64,
    /// Output directory for chunks
    pub output_dir: PathBuf,
    /// Session ID (used for chunk filenames)
    pub session_id: String,
    /// Which side of the conversation this tap records
    pub side: RecorderSide,
    /// Sample rate of the recorded audio
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

/// Metadata for a single recorded chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Chunk number (0-indexed)
    pub chunk_index: usize,
    /// File path to the chunk
    pub file_path: PathBuf,
    /// Start time in milliseconds since the tap started
    pub start_ms: u64,
    /// End time in milliseconds since the tap started
    pub end_ms: u64,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples in this chunk
    pub sample_count: usize,
}

/// WAV tap of one side of a voice conversation
///
/// Appends samples to fixed-duration WAV chunks, rotating files as the
/// conversation runs. Timestamps are derived from sample counts, so the
/// tap needs no clock of its own.
pub struct SessionRecorder {
    config: RecorderConfig,
    current: Option<ChunkWriter>,
    chunk_index: usize,
    samples_written: u64,
    finished: Vec<ChunkMetadata>,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)
            .context("Failed to create recording directory")?;

        info!(
            "Session tap initialized: {} [{}] (chunks: {}s each)",
            config.session_id,
            config.side.label(),
            config.chunk_duration_secs
        );

        Ok(Self {
            config,
            current: None,
            chunk_index: 0,
            samples_written: 0,
            finished: Vec::new(),
        })
    }

    /// Append samples to the tap, rotating chunks as needed
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if self.should_rotate() {
            if let Some(chunk) = self.current.take() {
                let meta = chunk.finish()?;
                info!(
                    "Tap chunk {} complete: {:.1}s - {:.1}s ({} samples)",
                    meta.chunk_index,
                    meta.start_ms as f64 / 1000.0,
                    meta.end_ms as f64 / 1000.0,
                    meta.sample_count
                );
                self.finished.push(meta);
            }

            self.current = Some(self.start_new_chunk()?);
        }

        if let Some(chunk) = &mut self.current {
            chunk.write_samples(samples)?;
            chunk.metadata.sample_count += samples.len();
        }
        if self.current.is_some() {
            self.samples_written += samples.len() as u64;
            let end_ms = self.elapsed_ms();
            if let Some(chunk) = &mut self.current {
                chunk.metadata.end_ms = end_ms;
            }
        }

        Ok(())
    }

    /// Finalize the tap, returning metadata for every chunk written
    pub fn finish(mut self) -> Result<Vec<ChunkMetadata>> {
        if let Some(chunk) = self.current.take() {
            let meta = chunk.finish()?;
            self.finished.push(meta);
        }

        info!(
            "Session tap complete: {} chunks saved",
            self.finished.len()
        );

        Ok(self.finished)
    }

    fn elapsed_ms(&self) -> u64 {
        self.samples_written * 1000
            / (self.config.sample_rate as u64 * self.config.channels as u64)
    }

    fn should_rotate(&self) -> bool {
        match &self.current {
            None => true,
            Some(chunk) => {
                let elapsed = self.elapsed_ms() - chunk.metadata.start_ms;
                elapsed >= self.config.chunk_duration_secs * 1000
            }
        }
    }

    fn start_new_chunk(&mut self) -> Result<ChunkWriter> {
        let path = self.config.output_dir.join(format!(
            "{}-{}-chunk-{:03}.wav",
            self.config.session_id,
            self.config.side.label(),
            self.chunk_index
        ));

        let chunk = ChunkWriter::new(
            path,
            self.chunk_index,
            self.elapsed_ms(),
            self.config.sample_rate,
            self.config.channels,
        )?;

        self.chunk_index += 1;

        Ok(chunk)
    }
}

/// Writes a single chunk to disk as a WAV file
struct ChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: ChunkMetadata,
}

impl ChunkWriter {
    fn new(
        file_path: PathBuf,
        chunk_index: usize,
        start_ms: u64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: ChunkMetadata {
                chunk_index,
                file_path,
                start_ms,
                end_ms: start_ms,
                sample_rate,
                channels,
                sample_count: 0,
            },
        })
    }

    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Result<ChunkMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// Open a recorded chunk for inspection
pub fn read_chunk(path: impl AsRef<Path>) -> Result<(hound::WavSpec, Vec<i16>)> {
    let reader = hound::WavReader::open(path.as_ref())
        .with_context(|| format!("Failed to open WAV file: {:?}", path.as_ref()))?;
    let spec = reader.spec();
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read audio samples")?;
    Ok((spec, samples))
}
