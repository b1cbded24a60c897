//! Deterministic stand-in emulation core
//!
//! Generates a sine or constant level in any supported format. Used by the
//! bridge binary in place of a real console and by tests as a known signal.

use std::f64::consts::TAU;

use crate::format::{AudioSourceFormat, BitDepth};
use crate::source::{EmulatorAudioSource, PcmProducerCore};

/// Signal produced by a [`ToneCore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Sine at the given frequency in Hz
    Sine { frequency: f64 },
    /// Constant level (DC), useful for gain checks
    Dc,
}

/// Synthetic emulation core producing a single tone on every channel.
#[derive(Debug, Clone)]
pub struct ToneCore {
    format: AudioSourceFormat,
    waveform: Waveform,
    /// Peak level in `[-1.0, 1.0]` of full scale
    amplitude: f64,
    /// Current phase in radians, kept in `[0, TAU)`
    phase: f64,
}

impl ToneCore {
    pub fn sine(format: AudioSourceFormat, frequency: f64) -> Self {
        Self {
            format,
            waveform: Waveform::Sine { frequency },
            amplitude: 1.0,
            phase: 0.0,
        }
    }

    pub fn dc(format: AudioSourceFormat, level: f64) -> Self {
        Self {
            format,
            waveform: Waveform::Dc,
            amplitude: level,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn format(&self) -> &AudioSourceFormat {
        &self.format
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Largest raw sample value for the format's bit depth.
    fn full_scale(&self) -> f64 {
        match self.format.bit_depth {
            BitDepth::Eight => f64::from(i8::MAX),
            BitDepth::Sixteen => f64::from(i16::MAX),
        }
    }

    fn next_level(&mut self) -> f64 {
        match self.waveform {
            Waveform::Sine { frequency } => {
                let value = self.phase.sin() * self.amplitude;
                self.phase = (self.phase + TAU * frequency / self.format.sample_rate) % TAU;
                value
            }
            Waveform::Dc => self.amplitude,
        }
    }
}

impl EmulatorAudioSource for ToneCore {
    fn channel_count(&self) -> u32 {
        self.format.channels.count() as u32
    }

    fn audio_bit_depth(&self) -> u32 {
        self.format.bit_depth.bits()
    }

    fn audio_sample_rate(&self) -> f64 {
        self.format.sample_rate
    }
}

impl PcmProducerCore for ToneCore {
    fn produce(&mut self, frames: usize, out: &mut Vec<u8>) {
        out.reserve(frames * self.format.bytes_per_frame());
        let full_scale = self.full_scale();
        let channels = self.format.channels.count();

        for _ in 0..frames {
            let raw = (self.next_level() * full_scale)
                .round()
                .clamp(-full_scale - 1.0, full_scale);
            for _ in 0..channels {
                match self.format.bit_depth {
                    BitDepth::Eight => out.push(raw as i8 as u8),
                    BitDepth::Sixteen => out.extend_from_slice(&(raw as i16).to_le_bytes()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produce_length_matches_format() {
        for (channels, bits) in [(1, 8), (2, 8), (1, 16), (2, 16)] {
            let format = AudioSourceFormat::new(channels, bits, 32_000.0).unwrap();
            let mut core = ToneCore::sine(format, 440.0);
            let mut out = Vec::new();
            core.produce(100, &mut out);
            assert_eq!(out.len(), 100 * format.bytes_per_frame());
        }
    }

    #[test]
    fn test_sine_starts_at_zero_and_rises() {
        let format = AudioSourceFormat::new(1, 16, 8_000.0).unwrap();
        let mut core = ToneCore::sine(format, 1_000.0);
        let mut out = Vec::new();
        core.produce(3, &mut out);

        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples[0], 0);
        assert!(samples[1] > 0);
        assert!(samples[2] > samples[1]);
    }

    #[test]
    fn test_dc_is_constant_on_all_channels() {
        let format = AudioSourceFormat::new(2, 8, 11_025.0).unwrap();
        let mut core = ToneCore::dc(format, 0.5);
        let mut out = Vec::new();
        core.produce(16, &mut out);
        assert!(out.iter().all(|&b| b as i8 == 64));
    }

    #[test]
    fn test_reports_format_metadata() {
        let format = AudioSourceFormat::new(2, 16, 32_040.5).unwrap();
        let core = ToneCore::sine(format, 220.0);
        assert_eq!(core.channel_count(), 2);
        assert_eq!(core.audio_bit_depth(), 16);
        assert_eq!(core.audio_sample_rate(), 32_040.5);
        assert_eq!(AudioSourceFormat::from_source(&core).unwrap(), format);
    }
}
