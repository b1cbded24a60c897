//! Pre-dimensioned working buffers for one renderer
//!
//! Sized once at configure time for the largest read a tick can make, then
//! sliced by offset on every tick. The render thread never grows them.

/// Raw byte and float working storage for a render tick.
#[derive(Debug)]
pub struct ScratchArena {
    pub(crate) raw: Box<[u8]>,
    pub(crate) left: Box<[f32]>,
    pub(crate) right: Box<[f32]>,
    pub(crate) filtered_left: Box<[f32]>,
    pub(crate) filtered_right: Box<[f32]>,
    max_source_frames: usize,
}

impl ScratchArena {
    /// Allocate for reads of up to `max_source_frames` frames.
    ///
    /// Channel buffers get `filter_taps` extra slots for the convolution tail.
    pub fn new(max_source_frames: usize, bytes_per_frame: usize, filter_taps: usize) -> Self {
        let padded = max_source_frames + filter_taps;
        Self {
            raw: vec![0u8; max_source_frames * bytes_per_frame].into_boxed_slice(),
            left: vec![0.0; padded].into_boxed_slice(),
            right: vec![0.0; padded].into_boxed_slice(),
            filtered_left: vec![0.0; max_source_frames].into_boxed_slice(),
            filtered_right: vec![0.0; max_source_frames].into_boxed_slice(),
            max_source_frames,
        }
    }

    /// Largest number of source frames a single tick may read
    pub fn max_source_frames(&self) -> usize {
        self.max_source_frames
    }

    /// Total bytes held, for logging
    pub fn footprint_bytes(&self) -> usize {
        self.raw.len()
            + (self.left.len()
                + self.right.len()
                + self.filtered_left.len()
                + self.filtered_right.len())
                * size_of::<f32>()
    }
}
