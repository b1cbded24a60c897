//! Emulation audio thread
//!
//! Runs the core's PCM producer on its own thread and pushes whole frames
//! into the byte ring. The thread wakes every millisecond (or immediately on
//! a command), produces whatever is due and goes back to waiting.
//!
//! ```text
//! Control Thread                  emu-audio Thread             Ring
//!     │                                 │                        │
//! [pause/resume]────(channel)────►[handle command]               │
//!     │                           [produce due frames]           │
//!     │                           [push_frames]──────────────►[bytes]
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nether_resample::{AudioSourceFormat, PcmProducer, PcmProducerCore};
use tracing::{debug, trace, warn};

use crate::config::{EmulatorConfig, Pacing};
use crate::error::BridgeError;

/// Wake-up interval when no command arrives
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long a pause request waits for the thread to acknowledge
const PAUSE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Emulation core that can be moved onto the emulation thread.
pub type BoxedCore = Box<dyn PcmProducerCore + Send>;

enum EmulatorCommand {
    /// Stop producing, drop the current core and acknowledge
    Pause(SyncSender<()>),
    /// Start producing from a new core
    Resume(BoxedCore),
}

/// Counters published by the emulation thread.
#[derive(Debug, Default)]
pub struct ProducerStats {
    frames_produced: AtomicU64,
    bytes_pushed: AtomicU64,
    bytes_dropped: AtomicU64,
}

impl ProducerStats {
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed.load(Ordering::Relaxed)
    }

    /// Bytes discarded because the ring was full
    pub fn bytes_dropped(&self) -> u64 {
        self.bytes_dropped.load(Ordering::Relaxed)
    }
}

pub struct EmulatorThread {
    rx: Receiver<EmulatorCommand>,
    producer: PcmProducer,
    core: Option<BoxedCore>,
    format: Option<AudioSourceFormat>,
    config: EmulatorConfig,
    stats: Arc<ProducerStats>,
    /// Reused PCM staging buffer
    buffer: Vec<u8>,
    /// Clock pacing: when the current core started and how much it has made since
    started: Instant,
    frames_since_start: u64,
}

impl EmulatorThread {
    /// Spawn the emulation thread around `core`.
    ///
    /// The core's format must be valid; `producer` is switched to its frame size.
    pub fn spawn(
        core: BoxedCore,
        producer: PcmProducer,
        config: &EmulatorConfig,
    ) -> Result<EmulatorHandle, BridgeError> {
        let format = AudioSourceFormat::from_source(&core)?;
        let (tx, rx) = mpsc::sync_channel::<EmulatorCommand>(4);
        let stats = Arc::new(ProducerStats::default());

        let mut emulator = Self {
            rx,
            producer,
            core: None,
            format: None,
            config: config.clone(),
            stats: stats.clone(),
            buffer: Vec::with_capacity(config.chunk_frames * format.bytes_per_frame()),
            started: Instant::now(),
            frames_since_start: 0,
        };
        emulator.start_core(core, format);

        let handle = thread::Builder::new()
            .name("emu-audio".into())
            .spawn(move || emulator.run())
            .map_err(|source| BridgeError::Spawn {
                name: "emu-audio",
                source,
            })?;

        Ok(EmulatorHandle {
            tx: Some(tx),
            handle: Some(handle),
            stats,
        })
    }

    fn run(&mut self) {
        debug!(
            "Emulator audio thread started ({:?} pacing)",
            self.config.pacing
        );

        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Emulator audio thread exiting (channel disconnected)");
                    break;
                }
            }

            self.produce_due();
        }
    }

    fn handle_command(&mut self, command: EmulatorCommand) {
        match command {
            EmulatorCommand::Pause(ack) => {
                if let Some(core) = self.core.take() {
                    trace!("Pausing core ({} frames produced)", self.frames_since_start);
                    drop(core);
                }
                self.format = None;
                let _ = ack.send(());
            }
            EmulatorCommand::Resume(core) => match AudioSourceFormat::from_source(&core) {
                Ok(format) => self.start_core(core, format),
                Err(e) => warn!("Refusing core with unusable audio format: {}", e),
            },
        }
    }

    fn start_core(&mut self, core: BoxedCore, format: AudioSourceFormat) {
        self.producer.set_bytes_per_frame(format.bytes_per_frame());
        self.core = Some(core);
        self.format = Some(format);
        self.started = Instant::now();
        self.frames_since_start = 0;
        debug!(
            "Emulator core running: {}ch {}bit {}Hz",
            format.channels.count(),
            format.bit_depth.bits(),
            format.sample_rate
        );
    }

    /// Frames the core owes right now under the configured pacing.
    fn frames_due(&self, format: &AudioSourceFormat) -> usize {
        match self.config.pacing {
            Pacing::Demand => {
                let target = (format.sample_rate * f64::from(self.config.target_fill_ms) / 1000.0)
                    .ceil() as usize;
                target
                    .saturating_sub(self.producer.occupied_frames())
                    .min(self.producer.vacant_frames())
            }
            Pacing::Clock => {
                let owed = (self.started.elapsed().as_secs_f64() * format.sample_rate) as u64;
                owed.saturating_sub(self.frames_since_start) as usize
            }
        }
    }

    fn produce_due(&mut self) {
        let Some(format) = self.format else {
            return;
        };
        let mut remaining = self.frames_due(&format);

        while remaining > 0 {
            let Some(core) = self.core.as_mut() else {
                return;
            };
            let frames = remaining.min(self.config.chunk_frames);
            self.buffer.clear();
            core.produce(frames, &mut self.buffer);

            let pushed = self.producer.push_frames(&self.buffer);
            let dropped = self.buffer.len() - pushed;

            self.frames_since_start += frames as u64;
            self.stats
                .frames_produced
                .fetch_add(frames as u64, Ordering::Relaxed);
            self.stats
                .bytes_pushed
                .fetch_add(pushed as u64, Ordering::Relaxed);
            if dropped > 0 {
                self.stats
                    .bytes_dropped
                    .fetch_add(dropped as u64, Ordering::Relaxed);
            }
            remaining -= frames;
        }
    }
}

/// Handle to the emulation thread. Dropping it stops and joins the thread.
pub struct EmulatorHandle {
    /// Option so it can be dropped before joining
    tx: Option<SyncSender<EmulatorCommand>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<ProducerStats>,
}

impl EmulatorHandle {
    /// Stop producing and wait until the thread has let go of the current core.
    ///
    /// After this returns, nothing more is pushed until [`resume`](Self::resume).
    pub fn pause(&self) -> Result<(), BridgeError> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(EmulatorCommand::Pause(ack_tx))?;
        ack_rx
            .recv_timeout(PAUSE_ACK_TIMEOUT)
            .map_err(|_| BridgeError::ThreadGone("emu-audio"))
    }

    /// Start producing from `core`.
    pub fn resume(&self, core: BoxedCore) -> Result<(), BridgeError> {
        self.send(EmulatorCommand::Resume(core))
    }

    fn send(&self, command: EmulatorCommand) -> Result<(), BridgeError> {
        let Some(ref tx) = self.tx else {
            return Err(BridgeError::ThreadGone("emu-audio"));
        };
        let mut command = command;
        loop {
            match tx.try_send(command) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    // Commands are rare; the thread drains its queue every poll
                    command = back;
                    thread::sleep(POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("Emulator audio thread disconnected");
                    return Err(BridgeError::ThreadGone("emu-audio"));
                }
            }
        }
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    /// Check if the emulation thread is still running
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        // The sender must go first: the thread only exits once recv_timeout
        // sees Disconnected, so joining while it is alive would deadlock.
        drop(self.tx.take());

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nether_resample::{SampleRingBuffer, ToneCore, byte_ring};

    fn tone(channels: u32, bits: u32, rate: f64) -> BoxedCore {
        let format = AudioSourceFormat::new(channels, bits, rate).unwrap();
        Box::new(ToneCore::sine(format, 440.0))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_demand_pacing_fills_to_target() {
        let (producer, consumer) = byte_ring(32_000 * 4, 4);
        let config = EmulatorConfig {
            pacing: Pacing::Demand,
            target_fill_ms: 50,
            chunk_frames: 256,
        };
        let handle = EmulatorThread::spawn(tone(2, 16, 32_000.0), producer, &config).unwrap();

        // 50 ms at 32 kHz stereo 16-bit
        assert!(wait_for(|| consumer.available_bytes() == 1600 * 4));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(consumer.available_bytes(), 1600 * 4);
        assert_eq!(handle.stats().frames_produced(), 1600);
        assert_eq!(handle.stats().bytes_dropped(), 0);
    }

    #[test]
    fn test_clock_pacing_drops_when_ring_full() {
        let (producer, consumer) = byte_ring(400, 4);
        let config = EmulatorConfig {
            pacing: Pacing::Clock,
            ..EmulatorConfig::default()
        };
        let handle = EmulatorThread::spawn(tone(2, 16, 32_000.0), producer, &config).unwrap();

        assert!(wait_for(|| handle.stats().bytes_dropped() > 0));
        assert_eq!(consumer.available_bytes(), 400);
    }

    #[test]
    fn test_pause_stops_production() {
        let (producer, mut consumer) = byte_ring(32_000 * 4, 4);
        let handle =
            EmulatorThread::spawn(tone(2, 16, 32_000.0), producer, &EmulatorConfig::default())
                .unwrap();
        assert!(wait_for(|| consumer.available_bytes() > 0));

        handle.pause().unwrap();
        let mut scratch = vec![0u8; 32_000 * 4];
        consumer.read(&mut scratch);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(consumer.available_bytes(), 0);
    }

    #[test]
    fn test_resume_switches_frame_size() {
        let (producer, mut consumer) = byte_ring(64 * 1024, 4);
        let handle =
            EmulatorThread::spawn(tone(2, 16, 32_000.0), producer, &EmulatorConfig::default())
                .unwrap();
        assert!(wait_for(|| consumer.available_bytes() > 0));

        handle.pause().unwrap();
        let mut scratch = vec![0u8; 64 * 1024];
        consumer.read(&mut scratch);

        handle.resume(tone(1, 8, 22_050.0)).unwrap();
        // 50 ms at 22.05 kHz mono 8-bit is 1103 one-byte frames
        assert!(wait_for(|| consumer.available_bytes() == 1103));
    }

    #[test]
    fn test_drop_joins_thread() {
        let (producer, _consumer) = byte_ring(1024, 4);
        let handle =
            EmulatorThread::spawn(tone(2, 16, 32_000.0), producer, &EmulatorConfig::default())
                .unwrap();
        assert!(handle.is_alive());
        drop(handle);
    }
}
