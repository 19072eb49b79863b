//! Error types for the Pomoisle timer.
//!
//! Nothing here is fatal to the process: every session error leaves the
//! timer in a valid, resumable state, and network errors are recovered
//! locally by the controller.

use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigError;

/// Errors raised synchronously by the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A recommendation carried durations that are not positive or are
    /// longer than a day.
    ///
    /// The previous config is retained.
    #[error("invalid session config: focus={focus_minutes}m rest={rest_minutes}m (each must be 1-1440)")]
    InvalidConfig {
        focus_minutes: i64,
        rest_minutes: i64,
    },

    /// The user stopped a focus session before a full minute had elapsed.
    ///
    /// No record is emitted and the focus phase restarts from full duration.
    #[error("focus session too short to record: {elapsed_secs}s elapsed (minimum 60s)")]
    InsufficientDuration { elapsed_secs: u32 },

    /// Stop-and-save was requested during a rest phase.
    ///
    /// The rest is abandoned and the timer returns to a paused focus phase
    /// without a record.
    #[error("only a focus session can be stopped and saved")]
    NotFocusing,
}

/// Top-level error type for the timer crate.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Recommendation service error.
    #[error("recommendation service error: {0}")]
    Client(#[from] ClientError),

    /// Session state machine rejected an operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// A specialized `Result` type for timer operations.
pub type Result<T> = std::result::Result<T, AppError>;
