//! Data model for the session timer.
//!
//! This module defines the values that flow between the state machine, the
//! recommendation service and presentation collaborators. Wire types use the
//! snake_case field names the recommendation service expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Seconds in one minute.
pub const SECS_PER_MINUTE: u32 = 60;

/// Longest phase a config may carry: one day.
pub const MAX_PHASE_MINUTES: u32 = 24 * 60;

/// The kind of interval currently being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Focus,
    Rest,
}

impl Phase {
    /// Returns the phase that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Focus => Self::Rest,
            Self::Rest => Self::Focus,
        }
    }

    #[must_use]
    pub fn is_focus(self) -> bool {
        self == Self::Focus
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Focus => "focus",
            Self::Rest => "rest",
        })
    }
}

/// Focus and rest durations, in whole minutes.
///
/// A config is replaced wholesale on every update and never partially
/// mutated. Both durations are guaranteed positive by [`SessionConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    focus_minutes: u32,
    rest_minutes: u32,
}

impl SessionConfig {
    /// Durations used whenever the recommendation service is unreachable.
    pub const DEFAULT: Self = Self {
        focus_minutes: 25,
        rest_minutes: 5,
    };

    /// Creates a config, rejecting durations outside
    /// `1..=`[`MAX_PHASE_MINUTES`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if either duration is zero or
    /// longer than a day.
    pub fn new(focus_minutes: u32, rest_minutes: u32) -> Result<Self, SessionError> {
        let in_range = |minutes: u32| (1..=MAX_PHASE_MINUTES).contains(&minutes);
        if !in_range(focus_minutes) || !in_range(rest_minutes) {
            return Err(SessionError::InvalidConfig {
                focus_minutes: i64::from(focus_minutes),
                rest_minutes: i64::from(rest_minutes),
            });
        }
        Ok(Self {
            focus_minutes,
            rest_minutes,
        })
    }

    #[must_use]
    pub fn focus_minutes(&self) -> u32 {
        self.focus_minutes
    }

    #[must_use]
    pub fn rest_minutes(&self) -> u32 {
        self.rest_minutes
    }

    /// Returns the configured minutes for `phase`.
    #[must_use]
    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_minutes,
            Phase::Rest => self.rest_minutes,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One completed or user-terminated interval.
///
/// Records are emitted exactly once, at the moment a phase ends, and are not
/// retained by the timer afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub is_focus: bool,
    pub planned_minutes: u32,
    pub actual_minutes: u32,
}

impl SessionRecord {
    /// A record for a phase that ran to zero; actual always equals planned.
    #[must_use]
    pub fn completed(phase: Phase, planned_minutes: u32) -> Self {
        Self {
            is_focus: phase.is_focus(),
            planned_minutes,
            actual_minutes: planned_minutes,
        }
    }

    /// A record for a focus phase the user stopped early.
    #[must_use]
    pub fn stopped_early(planned_minutes: u32, actual_minutes: u32) -> Self {
        Self {
            is_focus: true,
            planned_minutes,
            actual_minutes,
        }
    }
}

/// Activity category the recommendation service keys its history on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Study,
    Exercise,
    Work,
}

impl Theme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Exercise => "exercise",
            Self::Work => "work",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(Self::Study),
            "exercise" => Ok(Self::Exercise),
            "work" => Ok(Self::Work),
            other => Err(format!(
                "expected one of study, exercise, work; got '{other}'"
            )),
        }
    }
}

/// Payload returned by `GET /session/recommendation`.
///
/// Minutes are signed so that zero and negative values parse and can be
/// rejected as an invalid config rather than a malformed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationPayload {
    pub recommended_focus: i64,
    pub recommended_rest: i64,
    #[serde(default)]
    pub message: String,
}

/// Body sent with `POST /session/end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionEndBody {
    pub is_focus: bool,
    pub planned_duration: u32,
    pub actual_duration: u32,
    pub theme: Theme,
}

impl SessionEndBody {
    #[must_use]
    pub fn new(record: &SessionRecord, theme: Theme) -> Self {
        Self {
            is_focus: record.is_focus,
            planned_duration: record.planned_minutes,
            actual_duration: record.actual_minutes,
            theme,
        }
    }
}

/// A validated recommendation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub config: SessionConfig,
    pub message: String,
}

impl TryFrom<RecommendationPayload> for Recommendation {
    type Error = SessionError;

    fn try_from(payload: RecommendationPayload) -> Result<Self, Self::Error> {
        let invalid = || SessionError::InvalidConfig {
            focus_minutes: payload.recommended_focus,
            rest_minutes: payload.recommended_rest,
        };
        let focus = u32::try_from(payload.recommended_focus).map_err(|_| invalid())?;
        let rest = u32::try_from(payload.recommended_rest).map_err(|_| invalid())?;
        let config = SessionConfig::new(focus, rest).map_err(|_| invalid())?;

        Ok(Self {
            config,
            message: payload.message,
        })
    }
}

/// What presentation layers render for the running timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerDisplay {
    pub phase: Phase,
    /// Remaining time as `MM:SS`.
    pub clock: String,
    pub running: bool,
}

impl TimerDisplay {
    #[must_use]
    pub fn new(phase: Phase, remaining_secs: u32, running: bool) -> Self {
        Self {
            phase,
            clock: format_clock(remaining_secs),
            running,
        }
    }
}

impl fmt::Display for TimerDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.running { "running" } else { "paused" };
        write!(f, "[{:<5}] {} ({state})", self.phase, self.clock)
    }
}

/// A non-fatal condition surfaced to the user.
///
/// The timer stays usable after every notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The recommendation service was unreachable; default durations apply.
    FellBackToDefault { reason: String },
    /// The service returned unusable durations; the previous config stays.
    RecommendationRejected { reason: String },
    /// A finished session could not be reported and was dropped uncredited.
    SessionDropped { record: SessionRecord, reason: String },
    /// A focus session was stopped before one minute and not recorded.
    FocusTooShort { elapsed_secs: u32 },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FellBackToDefault { reason } => {
                write!(f, "recommendation unavailable, using 25/5 ({reason})")
            }
            Self::RecommendationRejected { reason } => {
                write!(f, "recommendation ignored ({reason})")
            }
            Self::SessionDropped { record, reason } => write!(
                f,
                "{} session of {}m was not saved ({reason})",
                if record.is_focus { "focus" } else { "rest" },
                record.actual_minutes
            ),
            Self::FocusTooShort { elapsed_secs } => write!(
                f,
                "focus under one minute is not recorded ({elapsed_secs}s elapsed)"
            ),
        }
    }
}

/// Formats seconds as zero-padded `MM:SS`.
#[must_use]
pub fn format_clock(total_secs: u32) -> String {
    let minutes = total_secs / SECS_PER_MINUTE;
    let seconds = total_secs % SECS_PER_MINUTE;
    format!("{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_alternates() {
        assert_eq!(Phase::Focus.next(), Phase::Rest);
        assert_eq!(Phase::Rest.next(), Phase::Focus);
    }

    #[test]
    fn config_rejects_zero_minutes() {
        assert!(matches!(
            SessionConfig::new(0, 5),
            Err(SessionError::InvalidConfig { focus_minutes: 0, .. })
        ));
        assert!(SessionConfig::new(25, 0).is_err());
        assert!(SessionConfig::new(1, 1).is_ok());
    }

    #[test]
    fn config_rejects_phases_longer_than_a_day() {
        assert!(SessionConfig::new(MAX_PHASE_MINUTES, MAX_PHASE_MINUTES).is_ok());
        assert!(matches!(
            SessionConfig::new(MAX_PHASE_MINUTES + 1, 5),
            Err(SessionError::InvalidConfig { focus_minutes: 1441, rest_minutes: 5 })
        ));
        assert!(SessionConfig::new(25, u32::MAX).is_err());
    }

    #[test]
    fn recommendation_rejects_huge_minutes() {
        let payload = RecommendationPayload {
            recommended_focus: 100_000_000,
            recommended_rest: 5,
            message: String::new(),
        };
        let err = Recommendation::try_from(payload).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidConfig {
                focus_minutes: 100_000_000,
                rest_minutes: 5
            }
        ));
    }

    #[test]
    fn config_minutes_for_phase() {
        let config = SessionConfig::new(30, 10).unwrap();
        assert_eq!(config.minutes_for(Phase::Focus), 30);
        assert_eq!(config.minutes_for(Phase::Rest), 10);
    }

    #[test]
    fn default_config_is_25_5() {
        assert_eq!(SessionConfig::default().focus_minutes(), 25);
        assert_eq!(SessionConfig::default().rest_minutes(), 5);
    }

    #[test]
    fn format_clock_pads_both_fields() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(6000), "100:00");
    }

    #[test]
    fn recommendation_payload_deserializes() {
        let json = r#"{"recommended_focus":28,"recommended_rest":6,"message":"keep going"}"#;
        let payload: RecommendationPayload = serde_json::from_str(json).unwrap();
        let rec = Recommendation::try_from(payload).unwrap();
        assert_eq!(rec.config, SessionConfig::new(28, 6).unwrap());
        assert_eq!(rec.message, "keep going");
    }

    #[test]
    fn recommendation_message_is_optional() {
        let json = r#"{"recommended_focus":25,"recommended_rest":5}"#;
        let payload: RecommendationPayload = serde_json::from_str(json).unwrap();
        assert!(payload.message.is_empty());
    }

    #[test]
    fn recommendation_rejects_negative_minutes() {
        let payload = RecommendationPayload {
            recommended_focus: -5,
            recommended_rest: 5,
            message: String::new(),
        };
        let err = Recommendation::try_from(payload).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidConfig {
                focus_minutes: -5,
                rest_minutes: 5
            }
        ));
    }

    #[test]
    fn session_end_body_uses_wire_names() {
        let record = SessionRecord::stopped_early(25, 12);
        let body = SessionEndBody::new(&record, Theme::Work);
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["is_focus"], true);
        assert_eq!(json["planned_duration"], 25);
        assert_eq!(json["actual_duration"], 12);
        assert_eq!(json["theme"], "work");
    }

    #[test]
    fn theme_parses_case_insensitively() {
        assert_eq!("Exercise".parse::<Theme>().unwrap(), Theme::Exercise);
        assert_eq!(" work ".parse::<Theme>().unwrap(), Theme::Work);
        assert!("sleep".parse::<Theme>().is_err());
    }

    #[test]
    fn notice_display_mentions_fallback_durations() {
        let notice = Notice::FellBackToDefault {
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            notice.to_string(),
            "recommendation unavailable, using 25/5 (connection refused)"
        );
    }

    #[test]
    fn display_renders_phase_and_clock() {
        let display = TimerDisplay::new(Phase::Rest, 299, false);
        assert_eq!(display.clock, "04:59");
        assert_eq!(display.to_string(), "[rest ] 04:59 (paused)");
    }
}
