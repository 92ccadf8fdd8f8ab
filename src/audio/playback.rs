// Playback scheduling for inbound agent audio
//
// Chunks arrive as base64 PCM and must play back-to-back with no audible
// gap or overlap. The scheduler keeps a timeline cursor (`next_start_time`)
// and places each decoded buffer at `max(cursor, clock)`, advancing the
// cursor by the buffer's duration. Decode and schedule run on the single
// session event task, so a later chunk can never overtake an earlier one.

use super::pcm;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A decoded, schedulable unit of output audio
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    /// Per-channel sample planes
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Build a buffer from interleaved float samples
    pub fn from_interleaved(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        Self {
            channels: pcm::deinterleave(samples, channels),
            sample_rate,
        }
    }

    /// Number of frames per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(|plane| plane.len()).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Output sink driven by the scheduler
///
/// `start` must begin playing the buffer at `start_at` on the sink's own
/// timeline (the one `clock_time` reports) and later push the buffer id on
/// the completion channel handed over at construction.
pub trait PlaybackSink: Send {
    /// Current position on the output timeline, in seconds
    fn clock_time(&self) -> f64;

    /// Schedule a buffer to begin playing at `start_at`
    fn start(&mut self, id: u64, buffer: &PlaybackBuffer, start_at: f64) -> Result<()>;

    /// Stop everything currently scheduled or playing
    fn stop_all(&mut self);

    /// Release the output device
    fn close(&mut self);
}

/// Creates the playback sink for each session start
pub trait SinkFactory: Send + Sync {
    fn create(&self) -> Result<(Box<dyn PlaybackSink>, mpsc::UnboundedReceiver<u64>)>;
}

/// Configuration for the playback scheduler
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Sample rate of inbound audio (the agent speaks at 24kHz)
    pub sample_rate: u32,
    /// Channel count of inbound audio
    pub channels: u16,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            channels: 1,
        }
    }
}

/// Schedules inbound audio chunks for contiguous, gapless playback
pub struct PlaybackScheduler {
    config: PlaybackConfig,
    sink: Box<dyn PlaybackSink>,
    completions: mpsc::UnboundedReceiver<u64>,
    /// Timeline position where the next buffer must begin
    next_start_time: f64,
    /// Ids of buffers currently scheduled or playing
    active: HashSet<u64>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(
        config: PlaybackConfig,
        sink: Box<dyn PlaybackSink>,
        completions: mpsc::UnboundedReceiver<u64>,
    ) -> Self {
        Self {
            config,
            sink,
            completions,
            next_start_time: 0.0,
            active: HashSet::new(),
            next_id: 0,
        }
    }

    /// Decode a base64 chunk and schedule it; returns the chosen start time
    pub fn enqueue_base64(&mut self, data: &str) -> Result<f64> {
        let bytes = pcm::decode_base64(data)?;
        self.enqueue_bytes(&bytes)
    }

    /// Decode raw LE int16 PCM bytes and schedule them
    pub fn enqueue_bytes(&mut self, bytes: &[u8]) -> Result<f64> {
        let samples = pcm::decode_pcm(bytes);
        let buffer = PlaybackBuffer::from_interleaved(
            &samples,
            self.config.sample_rate,
            self.config.channels,
        );
        self.schedule(buffer)
    }

    /// Place one buffer on the timeline
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<f64> {
        self.reap();

        let now = self.sink.clock_time();
        let start_at = if self.next_start_time > now {
            self.next_start_time
        } else {
            now
        };

        let id = self.next_id;
        self.next_id += 1;

        self.sink
            .start(id, &buffer, start_at)
            .context("Failed to schedule playback buffer")?;
        self.active.insert(id);
        self.next_start_time = start_at + buffer.duration_secs();

        debug!(
            "Scheduled buffer {} at {:.3}s ({} frames)",
            id,
            start_at,
            buffer.frames()
        );

        Ok(start_at)
    }

    /// Drop ids the sink has finished playing
    pub fn reap(&mut self) {
        while let Ok(id) = self.completions.try_recv() {
            self.active.remove(&id);
        }
    }

    /// Stop all playback immediately and reset the timeline cursor
    ///
    /// The next inbound chunk starts at "now" rather than at a stale
    /// pre-interruption offset.
    pub fn interrupt(&mut self) {
        info!(
            "Playback interrupted: stopping {} active buffers",
            self.active.len()
        );

        self.sink.stop_all();
        self.active.clear();
        while self.completions.try_recv().is_ok() {}
        self.next_start_time = 0.0;
    }

    /// Interrupt and release the output device
    pub fn shutdown(&mut self) {
        self.sink.stop_all();
        self.active.clear();
        self.next_start_time = 0.0;
        self.sink.close();
    }

    /// Number of buffers currently scheduled or playing
    pub fn active_buffers(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    /// Timeline position where the next buffer would begin
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

/// Playback sink with no output device
///
/// Keeps the timeline on the wall clock and reports each buffer complete
/// once its scheduled end passes, so the scheduler stays fully exercised
/// on headless hosts. A device-backed sink slots in behind the same trait.
pub struct NullSink {
    epoch: std::time::Instant,
    completions: mpsc::UnboundedSender<u64>,
    closed: bool,
}

impl NullSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                epoch: std::time::Instant::now(),
                completions: tx,
                closed: false,
            },
            rx,
        )
    }
}

impl PlaybackSink for NullSink {
    fn clock_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn start(&mut self, id: u64, buffer: &PlaybackBuffer, start_at: f64) -> Result<()> {
        if self.closed {
            anyhow::bail!("playback sink is closed");
        }

        let ends_in = (start_at + buffer.duration_secs() - self.clock_time()).max(0.0);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs_f64(ends_in)).await;
            let _ = completions.send(id);
        });

        Ok(())
    }

    fn stop_all(&mut self) {}

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Factory producing `NullSink`s
pub struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn create(&self) -> Result<(Box<dyn PlaybackSink>, mpsc::UnboundedReceiver<u64>)> {
        let (sink, completions) = NullSink::new();
        Ok((Box::new(sink), completions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestClock(Arc<Mutex<f64>>);

    struct TestSink {
        clock: Arc<Mutex<f64>>,
        started: Arc<Mutex<Vec<(u64, f64, f64)>>>,
        stops: Arc<Mutex<usize>>,
    }

    impl PlaybackSink for TestSink {
        fn clock_time(&self) -> f64 {
            *self.clock.lock().unwrap()
        }

        fn start(&mut self, id: u64, buffer: &PlaybackBuffer, start_at: f64) -> Result<()> {
            self.started
                .lock()
                .unwrap()
                .push((id, start_at, buffer.duration_secs()));
            Ok(())
        }

        fn stop_all(&mut self) {
            *self.stops.lock().unwrap() += 1;
        }

        fn close(&mut self) {}
    }

    fn scheduler() -> (
        PlaybackScheduler,
        TestClock,
        Arc<Mutex<Vec<(u64, f64, f64)>>>,
        mpsc::UnboundedSender<u64>,
    ) {
        let clock = Arc::new(Mutex::new(0.0));
        let started = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(Mutex::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let sink = TestSink {
            clock: Arc::clone(&clock),
            started: Arc::clone(&started),
            stops,
        };

        (
            PlaybackScheduler::new(PlaybackConfig::default(), Box::new(sink), rx),
            TestClock(clock),
            started,
            tx,
        )
    }

    fn buffer_of(duration_secs: f64) -> PlaybackBuffer {
        let frames = (duration_secs * 24000.0) as usize;
        PlaybackBuffer::from_interleaved(&vec![0.0; frames], 24000, 1)
    }

    #[test]
    fn test_sequential_chunks_are_gapless() {
        let (mut scheduler, _clock, started, _tx) = scheduler();

        for _ in 0..3 {
            scheduler.schedule(buffer_of(0.5)).unwrap();
        }

        let started = started.lock().unwrap();
        assert_eq!(started[0].1, 0.0);
        assert_eq!(started[1].1, 0.5);
        assert_eq!(started[2].1, 1.0);
    }

    #[test]
    fn test_late_chunk_starts_at_clock() {
        let (mut scheduler, clock, started, _tx) = scheduler();

        scheduler.schedule(buffer_of(0.5)).unwrap();
        *clock.0.lock().unwrap() = 2.0;
        scheduler.schedule(buffer_of(0.5)).unwrap();

        let started = started.lock().unwrap();
        assert_eq!(started[1].1, 2.0);
        assert_eq!(scheduler.next_start_time(), 2.5);
    }

    #[test]
    fn test_interrupt_clears_state() {
        let (mut scheduler, _clock, _started, _tx) = scheduler();

        scheduler.schedule(buffer_of(0.5)).unwrap();
        scheduler.schedule(buffer_of(0.5)).unwrap();
        assert_eq!(scheduler.active_buffers(), 2);

        scheduler.interrupt();
        assert_eq!(scheduler.active_buffers(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
    }

    #[test]
    fn test_completed_buffers_are_reaped() {
        let (mut scheduler, _clock, started, tx) = scheduler();

        scheduler.schedule(buffer_of(0.5)).unwrap();
        scheduler.schedule(buffer_of(0.5)).unwrap();

        let first_id = started.lock().unwrap()[0].0;
        tx.send(first_id).unwrap();
        assert_eq!(scheduler.active_buffers(), 1);
    }
}
