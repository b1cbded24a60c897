//! Output through the default audio device (cpal)
//!
//! The device callback is the render thread. It renders planar ticks through
//! [`RenderSide::fill_interleaved`] and converts to whatever sample format
//! the device wants.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error};

use crate::error::BridgeError;
use crate::pipeline::RenderSide;

/// Default output device and its preferred stream configuration.
pub struct DeviceTarget {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
}

impl DeviceTarget {
    /// Find the default output device.
    pub fn default_output() -> Result<Self, BridgeError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BridgeError::Device("No audio output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| BridgeError::Device(format!("Failed to get default output config: {}", e)))?;
        Ok(Self { device, config })
    }

    /// Device sample rate; the pipeline's host rate must match it.
    pub fn sample_rate(&self) -> f64 {
        f64::from(self.config.sample_rate().0)
    }

    pub fn channels(&self) -> usize {
        usize::from(self.config.channels())
    }
}

/// Playing output stream. Audio stops when this is dropped.
pub struct DeviceOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl DeviceOutput {
    /// Build and start an output stream fed by `side`.
    pub fn start(target: DeviceTarget, side: RenderSide) -> Result<Self, BridgeError> {
        let DeviceTarget { device, config } = target;
        let sample_rate = config.sample_rate().0;
        let channels = usize::from(config.channels());
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let mut side = side;

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    side.fill_interleaved(data, channels, |s| s);
                },
                |err| error!("Audio stream error: {}", err),
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    side.fill_interleaved(data, channels, |s| {
                        (s * 32767.0).clamp(-32768.0, 32767.0) as i16
                    });
                },
                |err| error!("Audio stream error: {}", err),
                None,
            ),
            cpal::SampleFormat::U16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    // 0x8000 is silence for unsigned 16-bit
                    side.fill_interleaved(data, channels, |s| {
                        (s * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
                    });
                },
                |err| error!("Audio stream error: {}", err),
                None,
            ),
            other => {
                return Err(BridgeError::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        }
        .map_err(|e| BridgeError::Device(format!("Failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| BridgeError::Device(format!("Failed to play audio stream: {}", e)))?;

        debug!(
            "Output stream started at {}Hz, {} channels, {:?}",
            sample_rate, channels, sample_format
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
