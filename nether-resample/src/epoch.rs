//! Epoch-swapped reconfiguration
//!
//! The control thread builds a complete [`RenderFunction`] (configuration and
//! scratch arena) and parks it in a single pending slot. At the start of each
//! tick the render thread `try_lock`s the slot and, if something is waiting,
//! swaps the whole epoch in at once. A tick therefore never sees a new rate
//! ratio with an old bit depth. The replaced epoch is sent back to the
//! control side so its buffers are freed off the render thread.
//!
//! ```text
//! Control Thread                              Render Thread
//!     │                                            │
//! [configure → RenderFunction]                     │
//! [publish]──────►(pending slot)──try_lock───►[adopt at tick start]
//!     │                                       [render]
//! [collect_retired]◄────(retired channel)◄────[retire old epoch]
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, TryLockError};

use tracing::{debug, trace, warn};

use crate::engine::{
    RenderFunction, ResamplerConfig, ResamplerOptions, configure, validate_host_rate,
};
use crate::error::ConfigurationError;
use crate::format::AudioSourceFormat;
use crate::ring::SampleRingBuffer;
use crate::source::EmulatorAudioSource;
use crate::stats::{RenderStats, StatsSnapshot};

/// Retired epochs buffered before the render thread falls back to dropping them itself
const RETIRED_CAPACITY: usize = 4;

struct Epoch {
    id: u64,
    render: RenderFunction,
}

struct Shared {
    pending: Mutex<Option<Epoch>>,
    active_epoch: AtomicU64,
    stats: RenderStats,
}

/// Entry point for building a control/render pair.
pub struct ResamplingEngine;

impl ResamplingEngine {
    /// Create a control handle and its renderer for a fixed host rate.
    ///
    /// The renderer starts in epoch 0, which is silent until the first
    /// [`EngineControl::reconfigure`].
    pub fn new(
        host_sample_rate: f64,
        options: ResamplerOptions,
    ) -> Result<(EngineControl, Renderer), ConfigurationError> {
        validate_host_rate(host_sample_rate)?;
        options.validate()?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            active_epoch: AtomicU64::new(0),
            stats: RenderStats::default(),
        });
        let (retire_tx, retire_rx) = mpsc::sync_channel(RETIRED_CAPACITY);

        let control = EngineControl {
            shared: shared.clone(),
            host_sample_rate,
            options,
            next_epoch: 1,
            retired: retire_rx,
        };
        let renderer = Renderer {
            shared,
            current: Epoch {
                id: 0,
                render: RenderFunction::silent(),
            },
            retire: retire_tx,
        };
        Ok((control, renderer))
    }
}

/// Control side: publishes new configurations. Never touched by the render thread.
pub struct EngineControl {
    shared: Arc<Shared>,
    host_sample_rate: f64,
    options: ResamplerOptions,
    next_epoch: u64,
    retired: Receiver<Epoch>,
}

impl EngineControl {
    /// Publish a configuration for `format`. Returns the new epoch id.
    ///
    /// On error a silent epoch is published instead, so the renderer stops
    /// playing the previous format.
    pub fn reconfigure(&mut self, format: &AudioSourceFormat) -> Result<u64, ConfigurationError> {
        self.collect_retired();
        match configure(format, self.host_sample_rate, &self.options) {
            Ok(render) => Ok(self.publish(render)),
            Err(err) => {
                warn!("Resampler reconfiguration failed, rendering silence: {}", err);
                self.publish(RenderFunction::silent());
                Err(err)
            }
        }
    }

    /// Query `source` for its format and publish a matching configuration.
    pub fn reconfigure_from_source(
        &mut self,
        source: &dyn EmulatorAudioSource,
    ) -> Result<u64, ConfigurationError> {
        match AudioSourceFormat::from_source(source) {
            Ok(format) => self.reconfigure(&format),
            Err(err) => {
                warn!("Emulation core reported an unusable audio format: {}", err);
                self.collect_retired();
                self.publish(RenderFunction::silent());
                Err(err)
            }
        }
    }

    /// Publish a silent epoch (e.g. while the core is stopped).
    pub fn silence(&mut self) -> u64 {
        self.collect_retired();
        self.publish(RenderFunction::silent())
    }

    fn publish(&mut self, render: RenderFunction) -> u64 {
        let id = self.next_epoch;
        self.next_epoch += 1;

        let mut slot = self.shared.pending.lock().unwrap_or_else(|e| {
            warn!("Resampler epoch slot poisoned; continuing");
            e.into_inner()
        });
        // An epoch the renderer never adopted is superseded and freed here
        if let Some(stale) = slot.replace(Epoch { id, render }) {
            trace!("Epoch {} superseded before adoption", stale.id);
        }
        drop(slot);

        debug!("Published resampler epoch {}", id);
        id
    }

    /// Free epochs the renderer has swapped out. Returns how many were freed.
    pub fn collect_retired(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(epoch) = self.retired.try_recv() {
            trace!("Freed retired epoch {}", epoch.id);
            freed += 1;
        }
        freed
    }

    /// Epoch the renderer is currently using
    pub fn active_epoch(&self) -> u64 {
        self.shared.active_epoch.load(Ordering::Acquire)
    }

    /// Most recently published epoch
    pub fn latest_epoch(&self) -> u64 {
        self.next_epoch - 1
    }

    pub fn host_sample_rate(&self) -> f64 {
        self.host_sample_rate
    }

    pub fn options(&self) -> &ResamplerOptions {
        &self.options
    }

    pub fn render_stats(&self) -> &RenderStats {
        &self.shared.stats
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// Render side: owned by the host's audio callback.
pub struct Renderer {
    shared: Arc<Shared>,
    current: Epoch,
    retire: SyncSender<Epoch>,
}

impl Renderer {
    /// Render one tick, adopting a pending configuration first if there is one.
    ///
    /// Never blocks: if the control thread is mid-publish, the swap waits
    /// for the next tick.
    pub fn render<R: SampleRingBuffer + ?Sized>(
        &mut self,
        ring: &mut R,
        left: &mut [f32],
        right: &mut [f32],
        frame_capacity: usize,
    ) -> usize {
        self.adopt_pending();
        let outcome = self
            .current
            .render
            .render_tick(ring, left, right, frame_capacity);
        self.shared.stats.record(&outcome);
        outcome.frames_written
    }

    /// Swap in a pending configuration, if one is waiting and the slot is free.
    ///
    /// [`render`](Self::render) calls this itself. Callers that need to act on
    /// a format change before the first tick of the new epoch (e.g. discard
    /// bytes queued in the old format) can call it first. Returns whether a
    /// swap happened.
    pub fn adopt_pending(&mut self) -> bool {
        let next = match self.shared.pending.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
        };
        let Some(next) = next else {
            return false;
        };

        let old = std::mem::replace(&mut self.current, next);
        self.shared
            .active_epoch
            .store(self.current.id, Ordering::Release);
        self.shared.stats.record_epoch_swap();
        // If the control side is gone or backed up, the old epoch drops here
        if self.retire.try_send(old).is_err() {
            self.shared.stats.record_inline_retire();
        }
        true
    }

    /// Epoch currently in use
    pub fn epoch(&self) -> u64 {
        self.current.id
    }

    pub fn config(&self) -> Option<&ResamplerConfig> {
        self.current.render.config()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}
