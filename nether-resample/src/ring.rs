//! Byte ring buffer between the emulation and render threads
//!
//! The render side only depends on [`SampleRingBuffer`]. The stock
//! implementation is `ringbuf`'s lock-free heap consumer, whose reads and
//! occupancy checks never block.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

use crate::format::AudioSourceFormat;

/// Consumer side of a bounded SPSC byte ring.
pub trait SampleRingBuffer {
    /// Bytes that can be read right now without waiting.
    fn available_bytes(&self) -> usize;

    /// Read up to `dst.len()` bytes (the preferred size).
    ///
    /// Returns the number of bytes actually copied, which may be smaller.
    /// `dst.len()` is always a whole number of frames, and implementors must
    /// only ever return whole frames too: the renderer discards a trailing
    /// partial frame, and the bytes it lost would shift every later frame.
    fn read(&mut self, dst: &mut [u8]) -> usize;
}

impl SampleRingBuffer for HeapCons<u8> {
    fn available_bytes(&self) -> usize {
        self.occupied_len()
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        self.pop_slice(dst)
    }
}

impl<R: SampleRingBuffer + ?Sized> SampleRingBuffer for &mut R {
    fn available_bytes(&self) -> usize {
        (**self).available_bytes()
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        (**self).read(dst)
    }
}

/// Producer side of the byte ring.
///
/// Only whole frames are pushed, so the consumer always stays frame aligned
/// as long as the format does not change. When the ring is full the newest
/// data is dropped; unread data is never overwritten.
pub struct PcmProducer {
    inner: HeapProd<u8>,
    bytes_per_frame: usize,
    dropped_bytes: u64,
}

impl PcmProducer {
    /// Push as many whole frames from `bytes` as fit. Returns bytes pushed.
    pub fn push_frames(&mut self, bytes: &[u8]) -> usize {
        let room = self.vacant_frames() * self.bytes_per_frame;
        let whole = bytes.len() - bytes.len() % self.bytes_per_frame;
        let pushed = self.inner.push_slice(&bytes[..whole.min(room)]);

        let dropped = bytes.len() - pushed;
        if dropped > 0 {
            self.dropped_bytes += dropped as u64;
            debug!("PCM ring overflow: dropped {} bytes", dropped);
        }
        pushed
    }

    pub fn vacant_frames(&self) -> usize {
        self.inner.vacant_len() / self.bytes_per_frame
    }

    pub fn occupied_frames(&self) -> usize {
        self.inner.occupied_len() / self.bytes_per_frame
    }

    pub fn capacity_bytes(&self) -> usize {
        self.inner.capacity().get()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Switch to a new frame size after the core changed format.
    pub fn set_bytes_per_frame(&mut self, bytes_per_frame: usize) {
        self.bytes_per_frame = bytes_per_frame.max(1);
    }

    /// Total bytes discarded because the ring was full
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }
}

/// Create a byte ring of `capacity_bytes` and split it into its two halves.
pub fn byte_ring(capacity_bytes: usize, bytes_per_frame: usize) -> (PcmProducer, HeapCons<u8>) {
    let ring = HeapRb::<u8>::new(capacity_bytes.max(1));
    let (producer, consumer) = ring.split();
    (
        PcmProducer {
            inner: producer,
            bytes_per_frame: bytes_per_frame.max(1),
            dropped_bytes: 0,
        },
        consumer,
    )
}

/// Ring size holding `millis` of audio in `format`, rounded to whole frames.
pub fn ring_capacity_bytes(format: &AudioSourceFormat, millis: u32) -> usize {
    let frames = (format.sample_rate * f64::from(millis) / 1000.0).ceil() as usize;
    frames.max(2) * format.bytes_per_frame()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_only_whole_frames() {
        let (mut producer, consumer) = byte_ring(64, 4);
        let pushed = producer.push_frames(&[1u8; 10]);
        assert_eq!(pushed, 8);
        assert_eq!(consumer.available_bytes(), 8);
        // The trailing partial frame counts as dropped
        assert_eq!(producer.dropped_bytes(), 2);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let (mut producer, mut consumer) = byte_ring(8, 2);
        assert_eq!(producer.push_frames(&[1, 1, 2, 2, 3, 3]), 6);
        assert_eq!(producer.push_frames(&[4, 4, 5, 5]), 2);
        assert_eq!(producer.dropped_bytes(), 2);

        let mut out = [0u8; 8];
        assert_eq!(consumer.read(&mut out), 8);
        assert_eq!(out, [1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_short_read_returns_actual_count() {
        let (mut producer, mut consumer) = byte_ring(32, 1);
        producer.push_frames(&[7u8; 5]);
        let mut out = [0u8; 16];
        assert_eq!(consumer.read(&mut out), 5);
        assert_eq!(consumer.available_bytes(), 0);
    }

    #[test]
    fn test_read_through_mut_reference() {
        let (mut producer, mut consumer) = byte_ring(16, 1);
        producer.push_frames(&[1, 2, 3]);
        let mut by_ref = &mut consumer;
        assert_eq!(SampleRingBuffer::available_bytes(&by_ref), 3);
        let mut out = [0u8; 2];
        assert_eq!(SampleRingBuffer::read(&mut by_ref, &mut out), 2);
    }

    #[test]
    fn test_ring_capacity_for_duration() {
        let format = AudioSourceFormat::new(2, 16, 32_000.0).unwrap();
        assert_eq!(ring_capacity_bytes(&format, 150), 4800 * 4);
    }
}
