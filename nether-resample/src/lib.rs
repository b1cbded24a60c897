//! Nether-Resample: emulator-to-host audio clock bridge
//!
//! An emulated console produces raw PCM at its own sample rate and pushes it
//! into a lock-free ring buffer. The host audio device pulls planar `f32`
//! frames at its own, unrelated rate. This crate sits between the two on the
//! render thread: it drains whatever the ring holds, converts it to float,
//! low-pass filters it and linearly interpolates it onto the host grid.
//!
//! # Architecture
//!
//! ```text
//! Emulation Thread               Ring (SPSC bytes)           Render Thread
//!       │                              │                          │
//! [PcmProducerCore::produce]           │                          │
//! [PcmProducer::push_frames]──────►[HeapRb<u8>]──────────►[Renderer::render]
//!                                                          [deinterleave → f32]
//! Control Thread                                           [Hamming low-pass]
//! [EngineControl::reconfigure]──(epoch slot)──────────────►[interpolate → host rate]
//! ```
//!
//! # Render contract
//!
//! - The render path never blocks, never allocates and never logs.
//! - Underruns and short reads are not errors; they are reported through the
//!   returned frame count and [`RenderStats`].
//! - Frames past the returned count (up to `frame_capacity`) are always
//!   zero-filled.
//!
//! # Usage
//!
//! ```
//! use nether_resample::{AudioSourceFormat, ResamplerOptions, byte_ring, configure};
//!
//! let format = AudioSourceFormat::new(2, 16, 32_000.0).unwrap();
//! let mut render = configure(&format, 44_100.0, &ResamplerOptions::default()).unwrap();
//!
//! let (mut producer, mut consumer) = byte_ring(64 * 1024, format.bytes_per_frame());
//! producer.push_frames(&vec![0u8; 1000 * format.bytes_per_frame()]);
//!
//! let mut left = vec![0.0f32; 512];
//! let mut right = vec![0.0f32; 512];
//! let written = render.render(&mut consumer, &mut left, &mut right, 512);
//! assert_eq!(written, 512);
//! ```

mod convert;
mod engine;
mod epoch;
mod error;
mod filter;
mod format;
mod kernel;
mod ring;
mod scratch;
mod source;
mod stats;
mod tone;

pub use convert::{deinterleave_mono, deinterleave_stereo};
pub use engine::{
    MAX_FRAME_CAPACITY, MAX_SOURCE_FRAMES, RenderFunction, ResamplerConfig, ResamplerOptions,
    TickKind, TickOutcome, configure,
};
pub use epoch::{EngineControl, Renderer, ResamplingEngine};
pub use error::ConfigurationError;
pub use filter::{DEFAULT_FILTER_TAPS, FilterCoefficients, hamming_window, make_filter};
pub use format::{AudioSourceFormat, BitDepth, ChannelLayout, HEADROOM};
pub use kernel::{
    InterpolationKernel, KernelChoice, LANES, LaneKernel, ScalarKernel, max_output_frames,
    source_position,
};
pub use ring::{PcmProducer, SampleRingBuffer, byte_ring, ring_capacity_bytes};
pub use scratch::ScratchArena;
pub use source::{EmulatorAudioSource, PcmProducerCore};
pub use stats::{RenderStats, StatsLogger, StatsSnapshot};
pub use tone::{ToneCore, Waveform};
