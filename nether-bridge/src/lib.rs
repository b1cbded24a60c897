//! Nether-Bridge: runs an emulation core's audio through the resampler
//!
//! Three threads share one byte ring and one engine:
//!
//! ```text
//! emu-audio Thread            Control (caller)             Render Thread
//!       │                           │                  (render-clock or device)
//! [core.produce]                    │                           │
//! [push_frames]─────────(ring)──────┼──────────────────►[RenderSide::render]
//!       ▲                     [Pipeline::switch_core]           ▲
//!       └──(pause/resume)───────────┴───────(epoch slot)────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use nether_bridge::{BridgeConfig, HeadlessHost, Pipeline};
//! use nether_resample::{AudioSourceFormat, ToneCore};
//!
//! let config = BridgeConfig::default();
//! let format = AudioSourceFormat::new(2, 16, 32_000.0)?;
//! let core = Box::new(ToneCore::sine(format, 440.0));
//!
//! let (pipeline, side) = Pipeline::start(core, config.host.sample_rate, &config)?;
//! let host = HeadlessHost::spawn(side, config.host.sample_rate, config.host.frame_capacity)?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! let (_side, report) = host.stop()?;
//! println!("{:?} Hz", report.estimated_frequency());
//! # drop(pipeline);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
#[cfg(feature = "device-output")]
pub mod device;
mod emulator;
mod error;
mod host;
mod pipeline;

pub use config::{BridgeConfig, ConfigFileError, EmulatorConfig, HostConfig, Pacing};
pub use emulator::{BoxedCore, EmulatorHandle, EmulatorThread, ProducerStats};
pub use error::BridgeError;
pub use host::{HeadlessHandle, HeadlessHost, HostReport};
pub use pipeline::{Pipeline, RenderSide, VolumeControl};
