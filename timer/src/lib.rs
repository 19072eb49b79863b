//! Pomoisle Timer - focus/rest session timer with adaptive recommendations.
//!
//! This crate provides a countdown timer that alternates focus and rest
//! phases, reports finished sessions to an external recommendation service
//! and adapts future phase lengths from the service's answer.
//!
//! # Overview
//!
//! A [`clock`] tick source drives the [`machine`] one second at a time. When
//! a phase ends the [`controller`] broadcasts the session record and posts it
//! through the [`client`]. Acknowledged focus sessions are credited to the
//! [`progress`] total and trigger a new recommendation, which the
//! [`adapter`] hands back to the machine without disturbing a running
//! countdown.
//!
//! Rendering is left to callers: they subscribe to display, progress,
//! session-end and notice channels on the controller.
//!
//! # Modules
//!
//! - [`types`]: Phases, configs, session records and wire types
//! - [`error`]: Error types for timer operations
//! - [`config`]: Configuration from environment variables
//! - [`clock`]: Real and manual tick sources
//! - [`client`]: HTTP client for the recommendation service, with retry
//! - [`machine`]: The focus/rest state machine
//! - [`adapter`]: Reconciles fetched recommendations with the live timer
//! - [`progress`]: Cumulative acknowledged focus minutes
//! - [`controller`]: Single-writer event loop tying it all together

pub mod adapter;
pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod machine;
pub mod progress;
pub mod types;

pub use adapter::{FetchTicket, RecommendationAdapter, Resolution};
pub use client::{
    ClientConfig, ClientError, HttpRecommendationClient, RecommendationService, RetryPolicy,
};
pub use clock::{ClockHandle, IntervalClock, ManualClock, TickSource};
pub use config::Config;
pub use controller::{Command, NetworkOutcome, SessionController};
pub use error::{AppError, Result, SessionError};
pub use machine::{ApplyOutcome, SessionMachine, TimerState};
pub use progress::ProgressAggregator;
pub use types::{
    Notice, Phase, Recommendation, SessionConfig, SessionRecord, Theme, TimerDisplay,
};
