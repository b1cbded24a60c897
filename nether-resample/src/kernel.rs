//! Fractional-index linear interpolation kernels
//!
//! Both kernels compute exactly the same expression per output sample:
//!
//! ```text
//! pos  = i * rate_ratio            (f64)
//! idx  = floor(pos)
//! frac = (pos - idx) as f32
//! out  = f[idx] * (1 - frac) + f[idx + 1] * frac
//! ```
//!
//! The lane kernel evaluates eight outputs per step on a portable `[f32; 8]`
//! vector (which LLVM lowers to SSE/AVX/NEON where available) and hands the
//! remainder to the scalar kernel. No fused multiply-add is used, so both
//! paths are bit-identical.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Output samples per vector step
pub const LANES: usize = 8;

/// Source index and fractional offset for output sample `index`.
#[inline(always)]
pub fn source_position(index: usize, rate_ratio: f64) -> (usize, f32) {
    let pos = index as f64 * rate_ratio;
    let whole = pos.floor();
    (whole as usize, (pos - whole) as f32)
}

/// Number of output frames that can be interpolated from `source_frames`.
///
/// `min(frame_capacity, floor((source_frames - 1) / rate_ratio))`, trimmed
/// further if rounding would place the last read at or past the end.
/// Every output `i < result` satisfies `source_position(i).0 + 1 <= source_frames - 1`.
pub fn max_output_frames(source_frames: usize, rate_ratio: f64, frame_capacity: usize) -> usize {
    if source_frames < 2 || frame_capacity == 0 {
        return 0;
    }
    let limit = ((source_frames - 1) as f64 / rate_ratio).floor();
    let mut frames = if limit >= frame_capacity as f64 {
        frame_capacity
    } else {
        limit as usize
    };
    while frames > 0 && source_position(frames - 1, rate_ratio).0 + 1 >= source_frames {
        frames -= 1;
    }
    frames
}

/// Retimes a filtered source channel onto the host sample grid.
pub trait InterpolationKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fill `out` with interpolated samples starting at output index 0.
    ///
    /// `out.len()` must not exceed
    /// `max_output_frames(filtered.len(), rate_ratio, usize::MAX)`.
    fn interpolate(&self, filtered: &[f32], rate_ratio: f64, out: &mut [f32]);
}

/// One output sample per iteration. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarKernel;

impl ScalarKernel {
    fn interpolate_from(filtered: &[f32], rate_ratio: f64, first: usize, out: &mut [f32]) {
        for (offset, dst) in out.iter_mut().enumerate() {
            let (idx, frac) = source_position(first + offset, rate_ratio);
            *dst = filtered[idx] * (1.0 - frac) + filtered[idx + 1] * frac;
        }
    }
}

impl InterpolationKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn interpolate(&self, filtered: &[f32], rate_ratio: f64, out: &mut [f32]) {
        Self::interpolate_from(filtered, rate_ratio, 0, out);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct F32x8([f32; LANES]);

impl F32x8 {
    #[inline(always)]
    fn splat(value: f32) -> Self {
        Self([value; LANES])
    }
}

impl Add for F32x8 {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] + rhs.0[lane]))
    }
}

impl Sub for F32x8 {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] - rhs.0[lane]))
    }
}

impl Mul for F32x8 {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] * rhs.0[lane]))
    }
}

/// Eight output samples per iteration with a scalar tail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneKernel;

impl InterpolationKernel for LaneKernel {
    fn name(&self) -> &'static str {
        "lanes8"
    }

    fn interpolate(&self, filtered: &[f32], rate_ratio: f64, out: &mut [f32]) {
        let mut chunks = out.chunks_exact_mut(LANES);
        let mut first = 0;

        for chunk in &mut chunks {
            let mut current = [0.0f32; LANES];
            let mut next = [0.0f32; LANES];
            let mut frac = [0.0f32; LANES];
            for lane in 0..LANES {
                let (idx, f) = source_position(first + lane, rate_ratio);
                current[lane] = filtered[idx];
                next[lane] = filtered[idx + 1];
                frac[lane] = f;
            }

            let frac = F32x8(frac);
            let mixed = F32x8(current) * (F32x8::splat(1.0) - frac) + F32x8(next) * frac;
            chunk.copy_from_slice(&mixed.0);
            first += LANES;
        }

        ScalarKernel::interpolate_from(filtered, rate_ratio, first, chunks.into_remainder());
    }
}

/// Which interpolation kernel the renderer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    /// Lane kernel when the target has float SIMD, scalar otherwise
    #[default]
    Auto,
    Scalar,
    Vectorized,
}

impl KernelChoice {
    pub fn kernel(self) -> &'static dyn InterpolationKernel {
        match self {
            Self::Scalar => &ScalarKernel,
            Self::Vectorized => &LaneKernel,
            Self::Auto => {
                if cfg!(any(
                    target_feature = "sse2",
                    target_feature = "neon",
                    target_feature = "simd128"
                )) {
                    &LaneKernel
                } else {
                    &ScalarKernel
                }
            }
        }
    }
}
