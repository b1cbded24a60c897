//! Render thread health counters
//!
//! The render thread only bumps relaxed atomics. Reading and logging happen
//! on some other, non-real-time thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::{TickKind, TickOutcome};

/// Counters updated once per render tick.
#[derive(Debug, Default)]
pub struct RenderStats {
    ticks: AtomicU64,
    frames_requested: AtomicU64,
    frames_written: AtomicU64,
    underruns: AtomicU64,
    short_reads: AtomicU64,
    silent_ticks: AtomicU64,
    bytes_consumed: AtomicU64,
    epoch_swaps: AtomicU64,
    inline_retires: AtomicU64,
}

impl RenderStats {
    pub fn record(&self, outcome: &TickOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.frames_requested
            .fetch_add(outcome.frames_requested as u64, Ordering::Relaxed);
        self.frames_written
            .fetch_add(outcome.frames_written as u64, Ordering::Relaxed);
        self.bytes_consumed
            .fetch_add(outcome.bytes_read as u64, Ordering::Relaxed);
        if outcome.short_read {
            self.short_reads.fetch_add(1, Ordering::Relaxed);
        }
        match outcome.kind {
            TickKind::Rendered => {}
            TickKind::Underrun => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
            TickKind::Silent => {
                self.silent_ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_epoch_swap(&self) {
        self.epoch_swaps.fetch_add(1, Ordering::Relaxed);
    }

    /// A retired epoch had to be freed on the render thread
    pub(crate) fn record_inline_retire(&self) {
        self.inline_retires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_requested: self.frames_requested.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            silent_ticks: self.silent_ticks.load(Ordering::Relaxed),
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            epoch_swaps: self.epoch_swaps.load(Ordering::Relaxed),
            inline_retires: self.inline_retires.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RenderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub frames_requested: u64,
    pub frames_written: u64,
    pub underruns: u64,
    pub short_reads: u64,
    pub silent_ticks: u64,
    pub bytes_consumed: u64,
    pub epoch_swaps: u64,
    /// Retired epochs freed on the render thread because the control side
    /// was gone or had fallen behind
    pub inline_retires: u64,
}

impl StatsSnapshot {
    /// Counter increase since `earlier`
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.saturating_sub(earlier.ticks),
            frames_requested: self.frames_requested.saturating_sub(earlier.frames_requested),
            frames_written: self.frames_written.saturating_sub(earlier.frames_written),
            underruns: self.underruns.saturating_sub(earlier.underruns),
            short_reads: self.short_reads.saturating_sub(earlier.short_reads),
            silent_ticks: self.silent_ticks.saturating_sub(earlier.silent_ticks),
            bytes_consumed: self.bytes_consumed.saturating_sub(earlier.bytes_consumed),
            epoch_swaps: self.epoch_swaps.saturating_sub(earlier.epoch_swaps),
            inline_retires: self.inline_retires.saturating_sub(earlier.inline_retires),
        }
    }

    /// Share of requested host frames that carried real audio (1.0 when idle)
    pub fn fill_ratio(&self) -> f64 {
        if self.frames_requested == 0 {
            1.0
        } else {
            self.frames_written as f64 / self.frames_requested as f64
        }
    }
}

/// Periodic stats logger for a monitoring thread.
pub struct StatsLogger {
    last: StatsSnapshot,
    last_log_time: Instant,
    interval: Duration,
}

impl StatsLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: StatsSnapshot::default(),
            last_log_time: Instant::now(),
            interval,
        }
    }

    /// Log the per-interval delta if `interval` has passed. Returns the delta.
    pub fn maybe_log(&mut self, stats: &RenderStats) -> Option<StatsSnapshot> {
        if self.last_log_time.elapsed() < self.interval {
            return None;
        }

        let now = stats.snapshot();
        let delta = now.since(&self.last);
        debug!(
            "RESAMPLER STATS: ticks={}, fill={:.1}%, underruns={}, short_reads={}, silent={}, bytes={}, swaps={}, inline_retires={}",
            delta.ticks,
            delta.fill_ratio() * 100.0,
            delta.underruns,
            delta.short_reads,
            delta.silent_ticks,
            delta.bytes_consumed,
            delta.epoch_swaps,
            delta.inline_retires
        );

        self.last = now;
        self.last_log_time = Instant::now();
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(kind: TickKind, written: usize, short_read: bool) -> TickOutcome {
        TickOutcome {
            kind,
            frames_requested: 512,
            frames_written: written,
            bytes_read: written * 4,
            short_read,
        }
    }

    #[test]
    fn test_record_counts_by_kind() {
        let stats = RenderStats::default();
        stats.record(&outcome(TickKind::Rendered, 512, false));
        stats.record(&outcome(TickKind::Rendered, 100, true));
        stats.record(&outcome(TickKind::Underrun, 0, false));
        stats.record(&outcome(TickKind::Silent, 0, false));

        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 4);
        assert_eq!(snap.frames_requested, 2048);
        assert_eq!(snap.frames_written, 612);
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.short_reads, 1);
        assert_eq!(snap.silent_ticks, 1);
        assert_eq!(snap.bytes_consumed, 612 * 4);
    }

    #[test]
    fn test_since_and_fill_ratio() {
        let stats = RenderStats::default();
        stats.record(&outcome(TickKind::Rendered, 512, false));
        let first = stats.snapshot();
        stats.record(&outcome(TickKind::Rendered, 256, false));

        let delta = stats.snapshot().since(&first);
        assert_eq!(delta.ticks, 1);
        assert!((delta.fill_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(StatsSnapshot::default().fill_ratio(), 1.0);
    }

    #[test]
    fn test_logger_respects_interval() {
        let stats = RenderStats::default();
        let mut logger = StatsLogger::new(Duration::from_secs(3600));
        assert!(logger.maybe_log(&stats).is_none());

        let mut eager = StatsLogger::new(Duration::ZERO);
        stats.record(&outcome(TickKind::Underrun, 0, false));
        let delta = eager.maybe_log(&stats).unwrap();
        assert_eq!(delta.underruns, 1);
    }
}
