//! Headless render host
//!
//! Stands in for an audio device: a `render-clock` thread calls the
//! renderer once per `frame_capacity / sample_rate` seconds and keeps a
//! running [`HostReport`] of what came out.

use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::BridgeError;
use crate::pipeline::RenderSide;

/// Summary of the audio a host received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostReport {
    pub ticks: u64,
    pub frames_requested: u64,
    pub frames_written: u64,
    /// Ticks that got fewer valid frames than requested
    pub short_ticks: u64,
    /// Largest absolute sample on either channel
    pub peak: f32,
    /// Upward zero crossings on the left channel, valid frames only
    pub rising_crossings: u64,
    /// Host sample rate the report was taken at
    pub sample_rate: f64,
    last_left: f32,
}

impl HostReport {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Account for one tick's output.
    pub fn record(&mut self, left: &[f32], right: &[f32], requested: usize) {
        let written = left.len().min(right.len());
        self.ticks += 1;
        self.frames_requested += requested as u64;
        self.frames_written += written as u64;
        if written < requested {
            self.short_ticks += 1;
        }

        for (&l, &r) in left[..written].iter().zip(&right[..written]) {
            self.peak = self.peak.max(l.abs()).max(r.abs());
            if self.last_left < 0.0 && l >= 0.0 {
                self.rising_crossings += 1;
            }
            self.last_left = l;
        }
    }

    /// Dominant frequency of the left channel estimated from zero crossings.
    ///
    /// Only meaningful for a tone; `None` until some audio has arrived.
    pub fn estimated_frequency(&self) -> Option<f64> {
        if self.frames_written == 0 || self.sample_rate <= 0.0 {
            return None;
        }
        let seconds = self.frames_written as f64 / self.sample_rate;
        Some(self.rising_crossings as f64 / seconds)
    }

    /// Share of requested frames that carried audio
    pub fn fill_ratio(&self) -> f64 {
        if self.frames_requested == 0 {
            return 1.0;
        }
        self.frames_written as f64 / self.frames_requested as f64
    }
}

/// Host that drives a [`RenderSide`] without an audio device.
pub struct HeadlessHost;

impl HeadlessHost {
    /// Render `ticks` ticks back to back on the calling thread.
    pub fn run_offline(
        side: &mut RenderSide,
        sample_rate: f64,
        frame_capacity: usize,
        ticks: usize,
    ) -> HostReport {
        let mut report = HostReport::new(sample_rate);
        for _ in 0..ticks {
            render_tick(side, frame_capacity, &mut report);
        }
        report
    }

    /// Start a real-time `render-clock` thread.
    ///
    /// Runs until the returned handle is stopped or dropped.
    pub fn spawn(
        side: RenderSide,
        sample_rate: f64,
        frame_capacity: usize,
    ) -> Result<HeadlessHandle, BridgeError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 || frame_capacity == 0 {
            return Err(BridgeError::InvalidSetting(format!(
                "headless clock needs a positive rate and tick size (got {} Hz, {} frames)",
                sample_rate, frame_capacity
            )));
        }
        let period = Duration::from_secs_f64(frame_capacity as f64 / sample_rate);
        let (tx, rx) = mpsc::sync_channel::<()>(1);

        let handle = thread::Builder::new()
            .name("render-clock".into())
            .spawn(move || {
                let mut side = side;
                let mut report = HostReport::new(sample_rate);
                let mut next_tick = Instant::now();
                debug!("Render clock started: {} frames every {:?}", frame_capacity, period);

                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    render_tick(&mut side, frame_capacity, &mut report);
                    next_tick += period;

                    // After a long stall, restart the schedule instead of bursting
                    let now = Instant::now();
                    if now > next_tick + period * 4 {
                        trace!("Render clock fell behind, resynchronizing");
                        next_tick = now;
                    }
                }

                debug!("Render clock stopped after {} ticks", report.ticks);
                (side, report)
            })
            .map_err(|source| BridgeError::Spawn {
                name: "render-clock",
                source,
            })?;

        Ok(HeadlessHandle {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

fn render_tick(side: &mut RenderSide, frame_capacity: usize, report: &mut HostReport) {
    let frame_capacity = frame_capacity.min(side.max_frame_capacity());
    let written = side.render(frame_capacity);
    report.record(&side.left()[..written], &side.right()[..written], frame_capacity);
}

/// Handle to a running render clock.
pub struct HeadlessHandle {
    tx: Option<SyncSender<()>>,
    handle: Option<JoinHandle<(RenderSide, HostReport)>>,
}

impl HeadlessHandle {
    /// Stop the clock and take back the render side with its report.
    pub fn stop(mut self) -> Result<(RenderSide, HostReport), BridgeError> {
        drop(self.tx.take());
        let handle = self
            .handle
            .take()
            .ok_or(BridgeError::ThreadGone("render-clock"))?;
        handle
            .join()
            .map_err(|_| BridgeError::ThreadGone("render-clock"))
    }
}

impl Drop for HeadlessHandle {
    fn drop(&mut self) {
        // Sender first, or the join below never returns
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
