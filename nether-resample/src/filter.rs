//! Short Hamming-window low-pass filter
//!
//! Smooths the source stream before interpolation so that the linear
//! interpolator does not fold high-frequency content back into the audible
//! band. Taps are normalized to sum to 1.0, so DC gain is unity and
//! filtering never changes loudness.

use crate::error::ConfigurationError;

/// Tap count used unless overridden in [`ResamplerOptions`](crate::ResamplerOptions).
pub const DEFAULT_FILTER_TAPS: usize = 4;

/// Un-normalized Hamming window of length `taps`.
///
/// `w[n] = 0.54 - 0.46 * cos(2*pi*n / (taps - 1))`. A single tap is `[1.0]`.
pub fn hamming_window(taps: usize) -> Vec<f32> {
    if taps <= 1 {
        return vec![1.0; taps];
    }
    let span = (taps - 1) as f64;
    (0..taps)
        .map(|n| (0.54 - 0.46 * (std::f64::consts::TAU * n as f64 / span).cos()) as f32)
        .collect()
}

/// Hamming window of length `taps` divided by its sum (unity DC gain).
pub fn make_filter(taps: usize) -> Vec<f32> {
    let mut window = hamming_window(taps);
    let sum: f32 = window.iter().sum();
    if sum > 0.0 {
        for tap in &mut window {
            *tap /= sum;
        }
    }
    window
}

/// Normalized low-pass taps. Built once per configuration, read-only after.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    taps: Box<[f32]>,
}

impl FilterCoefficients {
    pub fn new(taps: usize) -> Result<Self, ConfigurationError> {
        if taps == 0 {
            return Err(ConfigurationError::InvalidOption(
                "filter_taps must be at least 1",
            ));
        }
        Ok(Self {
            taps: make_filter(taps).into_boxed_slice(),
        })
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Convolve `input` with the taps, writing one sample per output slot.
    ///
    /// `out[n] = sum_k taps[k] * input[n + k]`. `input` must hold at least
    /// `out.len() + taps - 1` samples; the caller pads the tail.
    pub fn apply(&self, input: &[f32], out: &mut [f32]) {
        debug_assert!(input.len() + 1 >= out.len() + self.taps.len());
        for (dst, window) in out.iter_mut().zip(input.windows(self.taps.len())) {
            let mut acc = 0.0f32;
            for (&tap, &sample) in self.taps.iter().zip(window) {
                acc += tap * sample;
            }
            *dst = acc;
        }
    }
}
