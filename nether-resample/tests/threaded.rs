//! Producer and renderer on separate threads, sharing only the byte ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use nether_resample::{
    AudioSourceFormat, PcmProducerCore, ResamplerOptions, ResamplingEngine, SampleRingBuffer,
    ToneCore, byte_ring, ring_capacity_bytes,
};

const SOURCE_FRAMES: usize = 32_000;
const CHUNK_FRAMES: usize = 256;

#[test]
fn test_concurrent_producer_and_renderer() {
    let format = AudioSourceFormat::new(2, 16, 32_000.0).unwrap();
    let (mut control, mut renderer) =
        ResamplingEngine::new(44_100.0, ResamplerOptions::default()).unwrap();
    control.reconfigure(&format).unwrap();

    let (mut producer, mut consumer) =
        byte_ring(ring_capacity_bytes(&format, 100), format.bytes_per_frame());
    let done = Arc::new(AtomicBool::new(false));

    let producer_done = done.clone();
    let producer_thread = thread::spawn(move || {
        let mut core = ToneCore::sine(format, 440.0);
        let mut chunk = Vec::new();
        let mut produced = 0;
        while produced < SOURCE_FRAMES {
            chunk.clear();
            core.produce(CHUNK_FRAMES, &mut chunk);
            let mut offset = 0;
            while offset < chunk.len() {
                let room = producer.vacant_frames() * producer.bytes_per_frame();
                if room == 0 {
                    thread::yield_now();
                    continue;
                }
                let end = (offset + room).min(chunk.len());
                offset += producer.push_frames(&chunk[offset..end]);
            }
            produced += CHUNK_FRAMES;
        }
        producer_done.store(true, Ordering::Release);
        producer.dropped_bytes()
    });

    let render_thread = thread::spawn(move || {
        let mut left = vec![0.0f32; 512];
        let mut right = vec![0.0f32; 512];
        let mut written = 0;
        let mut peak = 0.0f32;
        loop {
            let finished = done.load(Ordering::Acquire);
            let frames = renderer.render(&mut consumer, &mut left, &mut right, 512);
            written += frames;
            for sample in &left[..frames] {
                peak = peak.max(sample.abs());
            }
            assert_eq!(&left[..frames], &right[..frames]);
            if finished && consumer.available_bytes() < 2 * format.bytes_per_frame() {
                break;
            }
            if frames == 0 {
                thread::yield_now();
            }
        }
        (written, peak)
    });

    let dropped = producer_thread.join().unwrap();
    let (written, peak) = render_thread.join().unwrap();

    assert_eq!(dropped, 0);
    // Ideal would be SOURCE_FRAMES * 44100 / 32000; partial reads lose a little
    let ideal = SOURCE_FRAMES as f64 * 44_100.0 / 32_000.0;
    assert!(written as f64 > ideal * 0.5, "written {written}, ideal {ideal}");
    assert!(written as f64 <= ideal + 1.0);
    assert!(peak > 0.5 && peak <= 0.9 + 1e-6, "peak {peak}");

    let stats = control.stats();
    assert_eq!(stats.epoch_swaps, 1);
    assert_eq!(stats.frames_written, written as u64);
}
