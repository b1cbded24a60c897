//! Resampler configuration and the per-tick render function
//!
//! [`configure`] turns a source format and host rate into a [`RenderFunction`]
//! that owns everything a tick needs: the immutable [`ResamplerConfig`] and a
//! pre-dimensioned [`ScratchArena`]. One render tick:
//!
//! 1. Size the read: `ceil(capacity * ratio) + taps`, bounded by what the ring
//!    holds and by the arena.
//! 2. Fewer than two frames available: underrun, render nothing.
//! 3. Read, then trust only the bytes actually returned.
//! 4. Deinterleave to float with 0.9 headroom (mono converted once).
//! 5. Low-pass each channel with the normalized Hamming taps.
//! 6. Interpolate `min(capacity, floor((frames - 1) / ratio))` outputs.
//! 7. Zero-fill the rest of the requested capacity.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::{deinterleave_mono, deinterleave_stereo};
use crate::error::ConfigurationError;
use crate::filter::{DEFAULT_FILTER_TAPS, FilterCoefficients};
use crate::format::{AudioSourceFormat, ChannelLayout};
use crate::kernel::{KernelChoice, max_output_frames};
use crate::ring::SampleRingBuffer;
use crate::scratch::ScratchArena;


/// Largest tap count accepted from configuration
const MAX_FILTER_TAPS: usize = 64;

/// Largest host frame count a single tick may be sized for
pub const MAX_FRAME_CAPACITY: usize = 65_536;

/// Upper bound on source frames a single tick may read. Caps the scratch
/// arena at a few tens of megabytes whatever the rate ratio.
pub const MAX_SOURCE_FRAMES: usize = 1 << 20;

/// Tuning knobs that are fixed for the lifetime of an audio session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResamplerOptions {
    /// Low-pass filter length (default: 4, range: 1-64)
    #[serde(default = "default_filter_taps")]
    pub filter_taps: usize,
    /// Largest `frame_capacity` the host will ask for (default: 4096,
    /// range: 1-65536). Sizes the scratch arena; larger requests render fewer frames.
    #[serde(default = "default_max_frame_capacity")]
    pub max_frame_capacity: usize,
    /// Interpolation kernel (default: auto)
    #[serde(default)]
    pub kernel: KernelChoice,
}

fn default_filter_taps() -> usize {
    DEFAULT_FILTER_TAPS
}
fn default_max_frame_capacity() -> usize {
    4096
}

impl Default for ResamplerOptions {
    fn default() -> Self {
        Self {
            filter_taps: default_filter_taps(),
            max_frame_capacity: default_max_frame_capacity(),
            kernel: KernelChoice::default(),
        }
    }
}

impl ResamplerOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.filter_taps == 0 || self.filter_taps > MAX_FILTER_TAPS {
            return Err(ConfigurationError::InvalidOption(
                "filter_taps must be between 1 and 64",
            ));
        }
        if self.max_frame_capacity == 0 || self.max_frame_capacity > MAX_FRAME_CAPACITY {
            return Err(ConfigurationError::InvalidOption(
                "max_frame_capacity must be between 1 and 65536",
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_host_rate(host_sample_rate: f64) -> Result<(), ConfigurationError> {
    if !host_sample_rate.is_finite() || host_sample_rate <= 0.0 {
        return Err(ConfigurationError::InvalidHostSampleRate(host_sample_rate));
    }
    Ok(())
}

/// Constants derived from one source format and host rate.
///
/// Never mutated after construction; a format change builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplerConfig {
    format: AudioSourceFormat,
    host_sample_rate: f64,
    rate_ratio: f64,
    bytes_per_frame: usize,
    filter: FilterCoefficients,
    kernel: KernelChoice,
    max_frame_capacity: usize,
    max_source_frames: usize,
}

impl ResamplerConfig {
    pub fn new(
        format: AudioSourceFormat,
        host_sample_rate: f64,
        options: &ResamplerOptions,
    ) -> Result<Self, ConfigurationError> {
        validate_host_rate(host_sample_rate)?;
        options.validate()?;

        let rate_ratio = format.sample_rate / host_sample_rate;
        let bytes_per_frame = format.bytes_per_frame();
        let max_source_frames =
            worst_case_read(options.max_frame_capacity, rate_ratio, options.filter_taps)
                .filter(|&frames| frames.checked_mul(bytes_per_frame).is_some())
                .ok_or(ConfigurationError::InvalidOption(
                    "source rate too high for max_frame_capacity at this host rate",
                ))?;

        Ok(Self {
            format,
            host_sample_rate,
            rate_ratio,
            bytes_per_frame,
            filter: FilterCoefficients::new(options.filter_taps)?,
            kernel: options.kernel,
            max_frame_capacity: options.max_frame_capacity,
            max_source_frames,
        })
    }

    pub fn format(&self) -> &AudioSourceFormat {
        &self.format
    }

    pub fn host_sample_rate(&self) -> f64 {
        self.host_sample_rate
    }

    /// Source frames consumed per host frame
    pub fn rate_ratio(&self) -> f64 {
        self.rate_ratio
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn filter(&self) -> &FilterCoefficients {
        &self.filter
    }

    pub fn kernel(&self) -> KernelChoice {
        self.kernel
    }

    pub fn max_frame_capacity(&self) -> usize {
        self.max_frame_capacity
    }

    /// Most source frames any tick reads; sizes the scratch arena.
    pub fn max_source_frames(&self) -> usize {
        self.max_source_frames
    }

    /// Source frames to pull for `frame_capacity` host frames, including
    /// lookahead for interpolation and the filter tail. Saturates rather
    /// than wrapping for oversized requests.
    pub fn needed_frames(&self, frame_capacity: usize) -> usize {
        ((frame_capacity as f64 * self.rate_ratio).ceil() as usize)
            .saturating_add(self.filter.len())
    }
}

/// `ceil(capacity * ratio) + taps`, or `None` past [`MAX_SOURCE_FRAMES`].
fn worst_case_read(capacity: usize, rate_ratio: f64, taps: usize) -> Option<usize> {
    let scaled = (capacity as f64 * rate_ratio).ceil();
    if !scaled.is_finite() || scaled > MAX_SOURCE_FRAMES as f64 {
        return None;
    }
    (scaled as usize)
        .checked_add(taps)
        .filter(|&frames| frames <= MAX_SOURCE_FRAMES)
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Source data was rendered (possibly fewer frames than requested)
    Rendered,
    /// Fewer than two source frames were available
    Underrun,
    /// No configuration in effect, or nothing was requested
    Silent,
}

/// What happened during one render tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub kind: TickKind,
    /// Host frames requested, after clamping to the destination buffers
    pub frames_requested: usize,
    /// Valid host frames written
    pub frames_written: usize,
    /// Bytes removed from the ring
    pub bytes_read: usize,
    /// The ring returned fewer bytes than asked for
    pub short_read: bool,
}

impl TickOutcome {
    fn silent(frames_requested: usize) -> Self {
        Self {
            kind: TickKind::Silent,
            frames_requested,
            frames_written: 0,
            bytes_read: 0,
            short_read: false,
        }
    }

    fn underrun(frames_requested: usize, bytes_read: usize, short_read: bool) -> Self {
        Self {
            kind: TickKind::Underrun,
            frames_requested,
            frames_written: 0,
            bytes_read,
            short_read,
        }
    }
}

struct RenderState {
    config: ResamplerConfig,
    scratch: ScratchArena,
}

/// Configured render callback body. Owned by exactly one render thread.
///
/// A `RenderFunction` without a configuration renders silence.
pub struct RenderFunction {
    state: Option<RenderState>,
}

/// Build a render function for `format` played back at `host_sample_rate`.
pub fn configure(
    format: &AudioSourceFormat,
    host_sample_rate: f64,
    options: &ResamplerOptions,
) -> Result<RenderFunction, ConfigurationError> {
    let config = ResamplerConfig::new(*format, host_sample_rate, options)?;
    Ok(RenderFunction::from_config(config))
}

impl RenderFunction {
    /// Allocates the scratch arena for the worst-case read.
    pub fn from_config(config: ResamplerConfig) -> Self {
        let scratch = ScratchArena::new(
            config.max_source_frames,
            config.bytes_per_frame,
            config.filter.len(),
        );

        debug!(
            "Resampler configured: {}ch {}bit {}Hz -> {}Hz (ratio {:.6}, {} taps, {} kernel, {} bytes scratch)",
            config.format.channels.count(),
            config.format.bit_depth.bits(),
            config.format.sample_rate,
            config.host_sample_rate,
            config.rate_ratio,
            config.filter.len(),
            config.kernel.kernel().name(),
            scratch.footprint_bytes()
        );

        Self {
            state: Some(RenderState { config, scratch }),
        }
    }

    /// A render function that only ever produces silence.
    pub fn silent() -> Self {
        Self { state: None }
    }

    pub fn is_silent(&self) -> bool {
        self.state.is_none()
    }

    pub fn config(&self) -> Option<&ResamplerConfig> {
        self.state.as_ref().map(|state| &state.config)
    }

    /// Render up to `frame_capacity` host frames into `left` and `right`.
    ///
    /// Returns the number of valid frames written. Frames from there up to
    /// `frame_capacity` are zeroed.
    pub fn render<R: SampleRingBuffer + ?Sized>(
        &mut self,
        ring: &mut R,
        left: &mut [f32],
        right: &mut [f32],
        frame_capacity: usize,
    ) -> usize {
        self.render_tick(ring, left, right, frame_capacity)
            .frames_written
    }

    /// Same as [`render`](Self::render), reporting the full outcome.
    pub fn render_tick<R: SampleRingBuffer + ?Sized>(
        &mut self,
        ring: &mut R,
        left: &mut [f32],
        right: &mut [f32],
        frame_capacity: usize,
    ) -> TickOutcome {
        let capacity = frame_capacity.min(left.len()).min(right.len());
        let left = &mut left[..capacity];
        let right = &mut right[..capacity];

        let outcome = match self.state.as_mut() {
            Some(state) if capacity > 0 => state.render(ring, left, right),
            _ => TickOutcome::silent(capacity),
        };

        left[outcome.frames_written..].fill(0.0);
        right[outcome.frames_written..].fill(0.0);
        outcome
    }
}

impl std::fmt::Debug for RenderFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderFunction")
            .field("config", &self.config())
            .finish()
    }
}

impl RenderState {
    fn render<R: SampleRingBuffer + ?Sized>(
        &mut self,
        ring: &mut R,
        left: &mut [f32],
        right: &mut [f32],
    ) -> TickOutcome {
        let config = &self.config;
        let capacity = left.len();
        let bytes_per_frame = config.bytes_per_frame;

        let available_frames = ring.available_bytes() / bytes_per_frame;
        let frames_to_read = config
            .needed_frames(capacity)
            .min(available_frames)
            .min(self.scratch.max_source_frames());
        if frames_to_read < 2 {
            return TickOutcome::underrun(capacity, 0, false);
        }

        let requested = frames_to_read * bytes_per_frame;
        let bytes_read = ring.read(&mut self.scratch.raw[..requested]).min(requested);
        let short_read = bytes_read < requested;
        let source_frames = bytes_read / bytes_per_frame;
        if source_frames < 2 {
            return TickOutcome::underrun(capacity, bytes_read, short_read);
        }

        let ScratchArena {
            raw,
            left: work_left,
            right: work_right,
            filtered_left,
            filtered_right,
            ..
        } = &mut self.scratch;
        let raw = &raw[..source_frames * bytes_per_frame];
        let padded = source_frames + config.filter.len();
        let frames = max_output_frames(source_frames, config.rate_ratio, capacity);
        let kernel = config.kernel.kernel();
        let bit_depth = config.format.bit_depth;

        match config.format.channels {
            ChannelLayout::Mono => {
                deinterleave_mono(bit_depth, raw, &mut work_left[..source_frames]);
                hold_last_sample(&mut work_left[..padded], source_frames);
                config
                    .filter
                    .apply(&work_left[..padded], &mut filtered_left[..source_frames]);
                kernel.interpolate(
                    &filtered_left[..source_frames],
                    config.rate_ratio,
                    &mut left[..frames],
                );
                right[..frames].copy_from_slice(&left[..frames]);
            }
            ChannelLayout::Stereo => {
                deinterleave_stereo(
                    bit_depth,
                    raw,
                    &mut work_left[..source_frames],
                    &mut work_right[..source_frames],
                );
                for (work, filtered, out) in [
                    (&mut *work_left, &mut *filtered_left, &mut *left),
                    (&mut *work_right, &mut *filtered_right, &mut *right),
                ] {
                    hold_last_sample(&mut work[..padded], source_frames);
                    config
                        .filter
                        .apply(&work[..padded], &mut filtered[..source_frames]);
                    kernel.interpolate(
                        &filtered[..source_frames],
                        config.rate_ratio,
                        &mut out[..frames],
                    );
                }
            }
        }

        TickOutcome {
            kind: TickKind::Rendered,
            frames_requested: capacity,
            frames_written: frames,
            bytes_read,
            short_read,
        }
    }
}

/// Pad the convolution tail with the last real sample so DC survives to the end.
fn hold_last_sample(buffer: &mut [f32], source_frames: usize) {
    let last = buffer[source_frames - 1];
    buffer[source_frames..].fill(last);
}
