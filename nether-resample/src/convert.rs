//! Fixed-point PCM to planar float conversion

use crate::format::BitDepth;

/// Convert mono PCM into `out`. Converts `out.len()` samples.
pub fn deinterleave_mono(bit_depth: BitDepth, raw: &[u8], out: &mut [f32]) {
    let scale = bit_depth.scale();
    match bit_depth {
        BitDepth::Eight => {
            for (dst, &byte) in out.iter_mut().zip(raw) {
                *dst = f32::from(byte as i8) * scale;
            }
        }
        BitDepth::Sixteen => {
            for (dst, bytes) in out.iter_mut().zip(raw.chunks_exact(2)) {
                *dst = f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) * scale;
            }
        }
    }
}

/// Split interleaved stereo PCM into `left` and `right`.
///
/// Even samples go left, odd samples go right. Converts
/// `min(left.len(), right.len())` frames.
pub fn deinterleave_stereo(bit_depth: BitDepth, raw: &[u8], left: &mut [f32], right: &mut [f32]) {
    let scale = bit_depth.scale();
    let frames = left.iter_mut().zip(right.iter_mut());
    match bit_depth {
        BitDepth::Eight => {
            for ((l, r), bytes) in frames.zip(raw.chunks_exact(2)) {
                *l = f32::from(bytes[0] as i8) * scale;
                *r = f32::from(bytes[1] as i8) * scale;
            }
        }
        BitDepth::Sixteen => {
            for ((l, r), bytes) in frames.zip(raw.chunks_exact(4)) {
                *l = f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) * scale;
                *r = f32::from(i16::from_le_bytes([bytes[2], bytes[3]])) * scale;
            }
        }
    }
}
