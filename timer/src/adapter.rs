//! Reconciles asynchronous recommendation fetches with the live timer.
//!
//! A fetch is issued as a request carrying a [`FetchTicket`] and resolved
//! later, on the controller's task, as a response. Nothing touches the
//! machine in between. At resolution the outcome goes through
//! [`SessionMachine::apply_config`], so a response that lands while the
//! timer is running is deferred rather than rewriting the countdown.
//!
//! Responses are applied in arrival order and none is discarded, including
//! one that arrives after a newer fetch has already resolved.

use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::machine::{ApplyOutcome, SessionMachine};
use crate::types::{Notice, Recommendation, SessionConfig};

/// Identifies one in-flight recommendation fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    #[must_use]
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// How a resolved fetch was reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The recommended config was handed to the machine.
    Recommended(ApplyOutcome),
    /// The fetch failed; the default config was handed to the machine.
    FellBack(ApplyOutcome),
    /// The recommendation was unusable; the machine was not touched.
    Rejected,
}

impl Resolution {
    /// The machine outcome, if a config was handed over.
    #[must_use]
    pub fn apply_outcome(&self) -> Option<ApplyOutcome> {
        match self {
            Self::Recommended(outcome) | Self::FellBack(outcome) => Some(*outcome),
            Self::Rejected => None,
        }
    }
}

/// Tracks recommendation fetches and applies their results.
#[derive(Debug, Default)]
pub struct RecommendationAdapter {
    issued: u64,
    resolved: u64,
    newest_resolved: Option<FetchTicket>,
    message: Option<String>,
}

impl RecommendationAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a fetch is starting and returns its ticket.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        let ticket = FetchTicket(self.issued);
        debug!(ticket = ticket.0, "Recommendation fetch issued");
        ticket
    }

    /// Number of fetches issued but not yet resolved.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        usize::try_from(self.issued - self.resolved).unwrap_or(usize::MAX)
    }

    /// The message of the most recently applied recommendation.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Applies the outcome of a fetch to `machine`.
    ///
    /// Returns how the outcome was reconciled and, for failures, the notice
    /// to surface to the user.
    pub fn resolve(
        &mut self,
        ticket: FetchTicket,
        result: Result<Recommendation, ClientError>,
        machine: &mut SessionMachine,
    ) -> (Resolution, Option<Notice>) {
        self.resolved += 1;
        if self.newest_resolved.is_some_and(|newest| ticket < newest) {
            warn!(
                ticket = ticket.0,
                "Recommendation arrived after a newer one, applying anyway"
            );
        } else {
            self.newest_resolved = Some(ticket);
        }

        match result {
            Ok(rec) => {
                let outcome = machine.apply_config(rec.config);
                info!(
                    ticket = ticket.0,
                    focus_minutes = rec.config.focus_minutes(),
                    rest_minutes = rec.config.rest_minutes(),
                    deferred = outcome == ApplyOutcome::Deferred,
                    "Recommendation reconciled"
                );
                if !rec.message.is_empty() {
                    self.message = Some(rec.message);
                }
                (Resolution::Recommended(outcome), None)
            }
            Err(e) if e.is_network_failure() => {
                warn!(ticket = ticket.0, error = %e, "Recommendation unavailable, using defaults");
                let outcome = machine.apply_config(SessionConfig::DEFAULT);
                let notice = Notice::FellBackToDefault {
                    reason: e.to_string(),
                };
                (Resolution::FellBack(outcome), Some(notice))
            }
            Err(e) => {
                warn!(ticket = ticket.0, error = %e, "Recommendation rejected, keeping current config");
                let notice = Notice::RecommendationRejected {
                    reason: e.to_string(),
                };
                (Resolution::Rejected, Some(notice))
            }
        }
    }
}
