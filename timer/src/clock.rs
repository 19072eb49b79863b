//! Tick sources that drive the session timer.
//!
//! The controller never reads wall-clock time. It waits on a [`TickSource`]
//! and treats every tick as exactly one second removed from the timer.
//!
//! - [`IntervalClock`] ticks on a fixed `tokio` interval (one second in
//!   production, shorter for development).
//! - [`ManualClock`] ticks only when its [`ClockHandle`] is advanced, which
//!   lets tests drive the timer deterministically.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::trace;

/// A monotonic source of ticks.
pub trait TickSource: Send {
    /// Waits for the next tick.
    ///
    /// Returns `None` once the source is exhausted and will never tick again.
    /// Implementations must be cancel-safe: dropping the future before it
    /// completes must not lose a tick.
    fn next_tick(&mut self) -> impl Future<Output = Option<()>> + Send;

    /// Restarts the current period so the next tick is a full period away.
    ///
    /// Called when the timer resumes, so a partially elapsed period from
    /// before a pause is not counted.
    fn restart(&mut self) {}
}

/// Real clock backed by [`tokio::time::interval`].
#[derive(Debug)]
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    /// Creates a clock that first ticks one full `period` from now.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        // Catch up on late ticks rather than dropping them.
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self { interval }
    }

    /// Returns the tick period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

impl TickSource for IntervalClock {
    async fn next_tick(&mut self) -> Option<()> {
        self.interval.tick().await;
        Some(())
    }

    fn restart(&mut self) {
        trace!("Restarting interval clock");
        self.interval.reset();
    }
}

/// Test clock advanced explicitly through a [`ClockHandle`].
#[derive(Debug)]
pub struct ManualClock {
    ticks: mpsc::UnboundedReceiver<()>,
}

/// Handle used to advance a [`ManualClock`].
///
/// Dropping every handle exhausts the clock once queued ticks are consumed.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    ticks: mpsc::UnboundedSender<()>,
}

impl ManualClock {
    /// Creates a manual clock and the handle that drives it.
    #[must_use]
    pub fn new() -> (Self, ClockHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { ticks: rx }, ClockHandle { ticks: tx })
    }
}

impl TickSource for ManualClock {
    async fn next_tick(&mut self) -> Option<()> {
        self.ticks.recv().await
    }
}

impl ClockHandle {
    /// Queues `ticks` ticks, returning how many were accepted.
    ///
    /// Fewer than `ticks` are accepted only if the clock has been dropped.
    pub fn advance(&self, ticks: u32) -> u32 {
        let mut sent = 0;
        for _ in 0..ticks {
            if self.ticks.send(()).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }
}
