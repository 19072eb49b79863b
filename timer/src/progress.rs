//! Cumulative focus minutes.
//!
//! The total is credited only after the recommendation service has
//! acknowledged a focus session, so a session is never counted twice. A
//! session whose post fails is never credited.

use tokio::sync::watch;
use tracing::debug;

/// Running total of acknowledged focus minutes.
///
/// The aggregator is the single writer. Presentation layers read through
/// [`ProgressAggregator::total`] or a [`watch::Receiver`] from
/// [`ProgressAggregator::subscribe`].
#[derive(Debug)]
pub struct ProgressAggregator {
    total: watch::Sender<u32>,
}

impl ProgressAggregator {
    /// Creates an aggregator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        let (total, _) = watch::channel(0);
        Self { total }
    }

    /// Adds acknowledged focus minutes to the total.
    pub fn credit(&self, minutes: u32) {
        if minutes == 0 {
            return;
        }
        self.total.send_modify(|total| *total = total.saturating_add(minutes));
        debug!(minutes, total = *self.total.borrow(), "Focus minutes credited");
    }

    /// Current total in minutes.
    #[must_use]
    pub fn total(&self) -> u32 {
        *self.total.borrow()
    }

    /// Returns a read-only view that observes every change to the total.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.total.subscribe()
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}
