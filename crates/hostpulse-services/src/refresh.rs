//! Fixed-cadence refresh loop that owns the current snapshot.
//!
//! Ticks never overlap: the next period starts when the previous tick has
//! finished, so a slow sample stretches the interval instead of queueing.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use hostpulse_core::{HostpulseError, Snapshot};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::sampler::Collector;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("sampling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Receives each new snapshot. An error means the sink has gone away.
pub trait DisplaySink: Send {
    fn render(&mut self, snapshot: Arc<Snapshot>) -> hostpulse_core::Result<()>;
}

impl DisplaySink for Sender<Arc<Snapshot>> {
    fn render(&mut self, snapshot: Arc<Snapshot>) -> hostpulse_core::Result<()> {
        self.send(snapshot).map_err(|_| HostpulseError::SinkClosed)
    }
}

/// Single-writer slot holding the latest snapshot. Writes replace the
/// reference; a snapshot is never mutated in place.
#[derive(Clone)]
pub struct SnapshotSlot {
    inner: Arc<ArcSwapOption<Snapshot>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwapOption::empty()),
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.inner.load_full()
    }

    fn replace(&self, snapshot: Arc<Snapshot>) {
        self.inner.store(Some(snapshot));
    }
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sampling,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Sampling,
            _ => Self::Idle,
        }
    }
}

/// Tick counters returned when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub failures: u64,
}

pub struct RefreshLoop<C: Collector> {
    collector: Arc<C>,
    interval: Duration,
    slot: SnapshotSlot,
    state: Arc<AtomicU8>,
}

impl<C: Collector> RefreshLoop<C> {
    pub fn new(collector: C, interval: Duration) -> Self {
        Self {
            collector: Arc::new(collector),
            interval,
            slot: SnapshotSlot::new(),
            state: Arc::new(AtomicU8::new(LoopState::Idle as u8)),
        }
    }

    pub fn slot(&self) -> SnapshotSlot {
        self.slot.clone()
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Tick until `cancel` fires or the sink disconnects. Cancellation is only
    /// observed between ticks; a tick in progress always completes and is
    /// published.
    #[instrument(skip_all, fields(interval_ms = self.interval.as_millis() as u64))]
    pub async fn run<S: DisplaySink>(&self, sink: &mut S, cancel: CancellationToken) -> LoopStats {
        info!("Refresh loop started");
        let mut stats = LoopStats::default();

        while !cancel.is_cancelled() {
            let started = Instant::now();
            stats.ticks += 1;

            match self.tick().await {
                Ok(snapshot) => {
                    debug!(
                        tick = stats.ticks,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Tick complete"
                    );
                    if sink.render(snapshot).is_err() {
                        info!("Display sink disconnected, stopping");
                        break;
                    }
                }
                Err(e) => {
                    stats.failures += 1;
                    error!(tick = stats.ticks, error = %e, "Refresh tick failed, keeping previous snapshot");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(ticks = stats.ticks, failures = stats.failures, "Refresh loop stopped");
        stats
    }

    /// One Idle → Sampling → Idle transition. The collector runs on the
    /// blocking pool so the CPU window never stalls the runtime.
    async fn tick(&self) -> Result<Arc<Snapshot>, TickError> {
        self.state.store(LoopState::Sampling as u8, Ordering::SeqCst);
        let collector = self.collector.clone();
        let result = tokio::task::spawn_blocking(move || collector.collect()).await;
        self.state.store(LoopState::Idle as u8, Ordering::SeqCst);

        let snapshot = Arc::new(result?);
        self.slot.replace(snapshot.clone());
        Ok(snapshot)
    }
}
