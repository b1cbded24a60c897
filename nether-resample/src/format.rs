//! Source audio format as reported by the emulation core

use crate::error::ConfigurationError;
use crate::source::EmulatorAudioSource;

/// Gain applied during fixed-to-float conversion.
///
/// Leaves room for the filter and interpolation to overshoot without clipping.
pub const HEADROOM: f32 = 0.9;

/// Sample width of the raw PCM stream.
///
/// 8-bit samples are signed (`i8`), 16-bit samples are signed little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    pub fn from_bits(bits: u32) -> Result<Self, ConfigurationError> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            other => Err(ConfigurationError::UnsupportedBitDepth(other)),
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }

    /// Multiplier taking a raw sample to a float in roughly `[-0.9, 0.9]`.
    pub const fn scale(self) -> f32 {
        match self {
            Self::Eight => HEADROOM / 128.0,
            Self::Sixteen => HEADROOM / 32768.0,
        }
    }
}

/// Channel layout of the raw PCM stream (stereo is interleaved L, R).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn from_count(count: u32) -> Result<Self, ConfigurationError> {
        match count {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            other => Err(ConfigurationError::UnsupportedChannelCount(other)),
        }
    }

    pub const fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Validated source format. Fixed for one configuration epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSourceFormat {
    pub channels: ChannelLayout,
    pub bit_depth: BitDepth,
    /// Native sample rate of the emulated hardware, in Hz
    pub sample_rate: f64,
}

impl AudioSourceFormat {
    /// Validate raw metadata as reported by an emulation core.
    ///
    /// The bit depth is checked first, then the channel count, then the rate.
    pub fn new(
        channel_count: u32,
        bit_depth: u32,
        sample_rate: f64,
    ) -> Result<Self, ConfigurationError> {
        let bit_depth = BitDepth::from_bits(bit_depth)?;
        let channels = ChannelLayout::from_count(channel_count)?;
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ConfigurationError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            channels,
            bit_depth,
            sample_rate,
        })
    }

    /// Query an emulation core for its current audio format.
    pub fn from_source(source: &dyn EmulatorAudioSource) -> Result<Self, ConfigurationError> {
        Self::new(
            source.channel_count(),
            source.audio_bit_depth(),
            source.audio_sample_rate(),
        )
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.channels.count() * self.bit_depth.bytes()
    }
}
