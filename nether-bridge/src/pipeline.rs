//! Wiring between the emulation thread, the resampler and a render host
//!
//! [`Pipeline::start`] owns the non-real-time half (engine control and the
//! emulation thread). The returned [`RenderSide`] owns the real-time half and
//! is handed to a host: the headless clock or an output device callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nether_resample::{
    AudioSourceFormat, EngineControl, RenderStats, Renderer, ResamplingEngine, SampleRingBuffer,
    StatsSnapshot, byte_ring, ring_capacity_bytes,
};
use ringbuf::HeapCons;
use ringbuf::traits::Consumer;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::emulator::{BoxedCore, EmulatorHandle, EmulatorThread, ProducerStats};
use crate::error::BridgeError;

/// Running pipeline, controlled from a non-real-time thread.
pub struct Pipeline {
    control: EngineControl,
    emulator: EmulatorHandle,
    format: AudioSourceFormat,
    volume: VolumeControl,
}

impl Pipeline {
    /// Configure the resampler for `core`, start the emulation thread and
    /// return the render half for the host.
    pub fn start(
        core: BoxedCore,
        host_sample_rate: f64,
        config: &BridgeConfig,
    ) -> Result<(Pipeline, RenderSide), BridgeError> {
        config.validate()?;
        let format = AudioSourceFormat::from_source(&core)?;

        let (mut control, renderer) =
            ResamplingEngine::new(host_sample_rate, config.resampler.clone())?;
        control.reconfigure(&format)?;

        let capacity = ring_capacity_bytes(&format, config.host.ring_buffer_ms);
        let (producer, consumer) = byte_ring(capacity, format.bytes_per_frame());
        let emulator = EmulatorThread::spawn(core, producer, &config.emulator)?;

        info!(
            "Audio pipeline started: {}ch {}bit {}Hz -> {}Hz, ring {} bytes",
            format.channels.count(),
            format.bit_depth.bits(),
            format.sample_rate,
            host_sample_rate,
            capacity
        );

        let side = RenderSide::new(renderer, consumer, config.resampler.max_frame_capacity);
        let volume = side.volume_control();
        volume.set(config.host.volume);
        Ok((
            Pipeline {
                control,
                emulator,
                format,
                volume,
            },
            side,
        ))
    }

    /// Swap in a different emulation core, possibly with a different format.
    ///
    /// Production pauses, the new configuration is published, and once the
    /// renderer has adopted it (discarding bytes queued in the old format)
    /// the new core starts producing. If no host renders within `timeout`
    /// the core is started anyway. Returns the new epoch.
    pub fn switch_core(&mut self, core: BoxedCore, timeout: Duration) -> Result<u64, BridgeError> {
        let format = AudioSourceFormat::from_source(&core)?;

        self.emulator.pause()?;
        // On error the renderer is already on a silent epoch and the old core stays stopped
        let epoch = self.control.reconfigure(&format)?;

        let deadline = Instant::now() + timeout;
        while self.control.active_epoch() < epoch {
            if Instant::now() >= deadline {
                warn!("Renderer did not adopt epoch {} within {:?}", epoch, timeout);
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        self.emulator.resume(core)?;
        self.format = format;
        self.control.collect_retired();
        debug!("Switched emulation core (epoch {})", epoch);
        Ok(epoch)
    }

    /// Stop producing and render silence until the next [`switch_core`](Self::switch_core).
    pub fn stop_core(&mut self) -> Result<u64, BridgeError> {
        self.emulator.pause()?;
        Ok(self.control.silence())
    }

    pub fn format(&self) -> &AudioSourceFormat {
        &self.format
    }

    /// Output volume, taking effect on the next render tick (clamped to 0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.volume.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn control(&self) -> &EngineControl {
        &self.control
    }

    /// Free configurations the renderer has retired
    pub fn collect_retired(&mut self) -> usize {
        self.control.collect_retired()
    }

    pub fn render_stats(&self) -> &RenderStats {
        self.control.render_stats()
    }

    pub fn producer_stats(&self) -> &ProducerStats {
        self.emulator.stats()
    }
}

/// Output gain shared between the control thread and the render thread.
///
/// Stored as `f32` bits in an atomic so the render thread never locks.
#[derive(Debug, Clone)]
pub struct VolumeControl(Arc<AtomicU32>);

impl VolumeControl {
    pub fn new(volume: f32) -> Self {
        let control = Self(Arc::new(AtomicU32::new(1.0f32.to_bits())));
        control.set(volume);
        control
    }

    /// Get volume as f32 (0.0 - 1.0)
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set volume from f32 (clamped to 0.0 - 1.0, NaN is ignored)
    pub fn set(&self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.0
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// Real-time half: renderer, ring consumer and planar output buffers.
///
/// Buffers are sized once for `max_frame_capacity`; nothing here allocates
/// after construction.
pub struct RenderSide {
    renderer: Renderer,
    consumer: HeapCons<u8>,
    left: Vec<f32>,
    right: Vec<f32>,
    volume: VolumeControl,
}

impl RenderSide {
    /// Starts on the latest published epoch, keeping whatever is already queued.
    pub fn new(mut renderer: Renderer, consumer: HeapCons<u8>, max_frame_capacity: usize) -> Self {
        renderer.adopt_pending();
        Self {
            renderer,
            consumer,
            left: vec![0.0; max_frame_capacity],
            right: vec![0.0; max_frame_capacity],
            volume: VolumeControl::new(1.0),
        }
    }

    /// Handle for changing the output volume from another thread
    pub fn volume_control(&self) -> VolumeControl {
        self.volume.clone()
    }

    /// Largest tick [`render`](Self::render) accepts
    pub fn max_frame_capacity(&self) -> usize {
        self.left.len()
    }

    /// Render one tick of up to `frame_capacity` frames into the planar buffers.
    ///
    /// Returns valid frames; the rest of `frame_capacity` is silence. The
    /// output volume is applied to the valid frames.
    pub fn render(&mut self, frame_capacity: usize) -> usize {
        if self.renderer.adopt_pending() {
            // Whatever is queued belongs to the previous format
            self.consumer.clear();
        }
        let frame_capacity = frame_capacity.min(self.left.len());
        let written = self.renderer.render(
            &mut self.consumer,
            &mut self.left,
            &mut self.right,
            frame_capacity,
        );

        let volume = self.volume.get();
        if volume != 1.0 {
            for sample in self.left[..written]
                .iter_mut()
                .chain(self.right[..written].iter_mut())
            {
                *sample *= volume;
            }
        }
        written
    }

    /// Left channel of the last tick
    pub fn left(&self) -> &[f32] {
        &self.left
    }

    /// Right channel of the last tick
    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Fill an interleaved device buffer, rendering as many ticks as needed.
    ///
    /// Mono devices get the average of both channels; channels past the
    /// second are silent. Returns valid frames written.
    pub fn fill_interleaved<T: Copy>(
        &mut self,
        data: &mut [T],
        channels: usize,
        convert: impl Fn(f32) -> T,
    ) -> usize {
        if channels == 0 {
            return 0;
        }
        let silence = convert(0.0);
        let mut valid = 0;

        for chunk in data.chunks_mut(self.max_frame_capacity() * channels) {
            let frames = chunk.len() / channels;
            valid += self.render(frames);

            for (i, frame) in chunk.chunks_exact_mut(channels).enumerate() {
                let (l, r) = (self.left[i], self.right[i]);
                match frame {
                    [mono] => *mono = convert((l + r) * 0.5),
                    [first, second, rest @ ..] => {
                        *first = convert(l);
                        *second = convert(r);
                        rest.fill(silence);
                    }
                    [] => {}
                }
            }
            // A trailing partial frame never gets audio
            let whole = frames * channels;
            chunk[whole..].fill(silence);
        }
        valid
    }

    /// Bytes waiting in the ring
    pub fn queued_bytes(&self) -> usize {
        self.consumer.available_bytes()
    }

    pub fn epoch(&self) -> u64 {
        self.renderer.epoch()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.renderer.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nether_resample::{PcmProducerCore, ResamplerOptions, ToneCore};

    fn side_with_audio(format: AudioSourceFormat, frames: usize) -> RenderSide {
        let (mut control, renderer) =
            ResamplingEngine::new(48_000.0, ResamplerOptions::default()).unwrap();
        control.reconfigure(&format).unwrap();
        let (mut producer, consumer) = byte_ring(64 * 1024, format.bytes_per_frame());

        let mut pcm = Vec::new();
        ToneCore::dc(format, 0.5).produce(frames, &mut pcm);
        producer.push_frames(&pcm);
        RenderSide::new(renderer, consumer, 256)
    }

    #[test]
    fn test_render_caps_at_max_frame_capacity() {
        let format = AudioSourceFormat::new(2, 16, 48_000.0).unwrap();
        let mut side = side_with_audio(format, 4000);
        assert_eq!(side.render(10_000), 256);
    }

    #[test]
    fn test_fill_interleaved_stereo_chunks_and_silences() {
        let format = AudioSourceFormat::new(2, 16, 48_000.0).unwrap();
        let mut side = side_with_audio(format, 4000);

        let mut data = vec![1.0f32; 600 * 2 + 1];
        let valid = side.fill_interleaved(&mut data, 2, |s| s);
        assert_eq!(valid, 600);
        assert!(data[..1200].iter().all(|&s| (s - 0.45).abs() < 1e-3));
        assert_eq!(data[1200], 0.0);
    }

    #[test]
    fn test_fill_interleaved_mono_device_and_extra_channels() {
        let format = AudioSourceFormat::new(1, 16, 48_000.0).unwrap();
        let mut side = side_with_audio(format, 4000);

        let mut mono = vec![0i16; 100];
        side.fill_interleaved(&mut mono, 1, |s| (s * 32767.0) as i16);
        assert!(mono.iter().all(|&s| (s - 14745).abs() < 40));

        let mut quad = vec![9u16; 100 * 4];
        side.fill_interleaved(&mut quad, 4, |s| (s * 32767.0 + 32768.0) as u16);
        for frame in quad.chunks_exact(4) {
            assert!(frame[0] > 40_000);
            assert_eq!(frame[0], frame[1]);
            assert_eq!(&frame[2..], &[32768, 32768]);
        }
    }

    #[test]
    fn test_starved_device_buffer_is_silent() {
        let format = AudioSourceFormat::new(2, 8, 48_000.0).unwrap();
        let mut side = side_with_audio(format, 1);

        let mut data = vec![0.7f32; 64];
        assert_eq!(side.fill_interleaved(&mut data, 2, |s| s), 0);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(side.stats().underruns, 1);
    }

    #[test]
    fn test_volume_scales_rendered_frames() {
        let format = AudioSourceFormat::new(2, 16, 48_000.0).unwrap();
        let mut side = side_with_audio(format, 4000);
        let volume = side.volume_control();

        assert_eq!(side.render(128), 128);
        assert!(side.left()[64..128].iter().all(|&s| (s - 0.45).abs() < 1e-3));

        volume.set(0.5);
        assert_eq!(side.render(128), 128);
        assert!(side.left()[64..128].iter().all(|&s| (s - 0.225).abs() < 1e-3));
        assert!(side.right()[64..128].iter().all(|&s| (s - 0.225).abs() < 1e-3));

        volume.set(0.0);
        side.render(128);
        assert!(side.left()[..128].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_volume_control_clamps() {
        let volume = VolumeControl::new(3.0);
        assert_eq!(volume.get(), 1.0);
        volume.set(-1.0);
        assert_eq!(volume.get(), 0.0);
        volume.set(0.3);
        volume.set(f32::NAN);
        assert_eq!(volume.get(), 0.3);
    }

    #[test]
    fn test_epoch_change_discards_old_format_bytes() {
        let (mut control, renderer) =
            ResamplingEngine::new(48_000.0, ResamplerOptions::default()).unwrap();
        let stereo = AudioSourceFormat::new(2, 16, 48_000.0).unwrap();
        control.reconfigure(&stereo).unwrap();
        let (mut producer, consumer) = byte_ring(64 * 1024, stereo.bytes_per_frame());
        let mut side = RenderSide::new(renderer, consumer, 256);

        producer.push_frames(&vec![0u8; 1000 * 4]);
        side.render(256);
        assert!(side.queued_bytes() > 0);

        let mono = AudioSourceFormat::new(1, 8, 48_000.0).unwrap();
        control.reconfigure(&mono).unwrap();
        assert_eq!(side.render(256), 0);
        assert_eq!(side.queued_bytes(), 0);
        assert_eq!(side.epoch(), 2);
    }
}
