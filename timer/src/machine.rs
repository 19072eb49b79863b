//! Session state machine.
//!
//! The machine is a pure, synchronous transition function over
//! [`TimerState`]. It owns no threads and reads no clocks; the caller invokes
//! [`SessionMachine::tick`] once per elapsed second while the timer runs.
//!
//! ## State Transitions
//!
//! ```text
//!                start/pause               start/pause
//!   Focus(paused) <---------> Focus(running)      Rest(paused) <---------> Rest(running)
//!        ^                         |                   ^                         |
//!        |                         | expiry            |                         | expiry
//!        |                         +-------------------+                         |
//!        +-----------------------------------------------------------------------+
//! ```
//!
//! Every expiry emits a [`SessionRecord`], flips the phase and leaves the
//! timer paused, so each new phase has to be started explicitly.
//! `stop_and_save` and `reset` always return to a full, paused focus phase.
//!
//! ## Config updates
//!
//! A new [`SessionConfig`] never rewrites time already counted down in the
//! current phase. While running, updates are held as pending and promoted
//! when the phase ends or is stopped. The just-completed phase is always
//! reported with the minutes it was entered with.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::types::{Phase, SessionConfig, SessionRecord, TimerDisplay, SECS_PER_MINUTE};

/// Read-only copy of the machine's timing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub phase: Phase,
    /// Seconds left in the current phase. Zero is never observed between
    /// calls; reaching it triggers a transition within the same tick.
    pub remaining_secs: u32,
    pub running: bool,
    /// Length of the current phase as it was entered.
    pub planned_minutes: u32,
}

/// What happened to a config passed to [`SessionMachine::apply_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The config is now active.
    Applied,
    /// The timer is running; the config waits until the phase ends.
    Deferred,
}

/// The focus/rest countdown.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    config: SessionConfig,
    pending: Option<SessionConfig>,
    phase: Phase,
    planned_minutes: u32,
    remaining_secs: u32,
    running: bool,
}

impl SessionMachine {
    /// Creates a machine in `Focus(paused)` at the full focus duration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let planned_minutes = config.focus_minutes();
        Self {
            config,
            pending: None,
            phase: Phase::Focus,
            planned_minutes,
            remaining_secs: planned_minutes * SECS_PER_MINUTE,
            running: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The active config. A deferred update is not visible here until it
    /// has been promoted.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    #[must_use]
    pub fn pending_config(&self) -> Option<SessionConfig> {
        self.pending
    }

    /// Seconds counted down so far in the current phase.
    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.planned_secs().saturating_sub(self.remaining_secs)
    }

    #[must_use]
    pub fn snapshot(&self) -> TimerState {
        TimerState {
            phase: self.phase,
            remaining_secs: self.remaining_secs,
            running: self.running,
            planned_minutes: self.planned_minutes,
        }
    }

    #[must_use]
    pub fn display(&self) -> TimerDisplay {
        TimerDisplay::new(self.phase, self.remaining_secs, self.running)
    }

    fn planned_secs(&self) -> u32 {
        self.planned_minutes * SECS_PER_MINUTE
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Starts or resumes the countdown. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        debug!(phase = %self.phase, remaining_secs = self.remaining_secs, "Timer started");
        true
    }

    /// Pauses the countdown. Returns false if already paused.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        debug!(phase = %self.phase, remaining_secs = self.remaining_secs, "Timer paused");
        true
    }

    /// Removes one second from a running timer.
    ///
    /// Returns the record of the phase that just ended when the countdown
    /// reaches zero. Ticks while paused are ignored.
    pub fn tick(&mut self) -> Option<SessionRecord> {
        if !self.running {
            return None;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return None;
        }

        Some(self.expire())
    }

    /// Ends the current phase naturally and enters the next one, paused.
    fn expire(&mut self) -> SessionRecord {
        self.running = false;
        let record = SessionRecord::completed(self.phase, self.planned_minutes);
        self.promote_pending();
        self.enter(self.phase.next());

        info!(
            completed = if record.is_focus { "focus" } else { "rest" },
            minutes = record.planned_minutes,
            next = %self.phase,
            "Phase completed"
        );
        record
    }

    /// Ends a focus phase early and records the whole minutes it lasted.
    ///
    /// The timer returns to a full, paused focus phase in every case, rest
    /// included; stopping early never advances to rest.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFocusing`] during a rest phase (rest abandoned,
    ///   no record)
    /// - [`SessionError::InsufficientDuration`] if less than a minute has
    ///   elapsed (no record)
    pub fn stop_and_save(&mut self) -> Result<SessionRecord, SessionError> {
        let stopped_phase = self.phase;
        let planned_minutes = self.planned_minutes;
        let elapsed_secs = self.elapsed_secs();
        let actual_minutes = elapsed_secs / SECS_PER_MINUTE;

        self.running = false;
        self.promote_pending();
        self.enter(Phase::Focus);

        if stopped_phase != Phase::Focus {
            debug!(elapsed_secs, "Rest abandoned, back to focus");
            return Err(SessionError::NotFocusing);
        }

        if actual_minutes < 1 {
            debug!(elapsed_secs, "Focus stopped before one minute, not recorded");
            return Err(SessionError::InsufficientDuration { elapsed_secs });
        }

        info!(planned_minutes, actual_minutes, "Focus stopped early");
        Ok(SessionRecord::stopped_early(planned_minutes, actual_minutes))
    }

    /// Aborts whatever is in progress and returns to a full, paused focus
    /// phase without emitting a record.
    pub fn reset(&mut self) {
        self.running = false;
        self.promote_pending();
        self.enter(Phase::Focus);
        debug!(remaining_secs = self.remaining_secs, "Timer reset");
    }

    /// Offers a new config to the machine.
    ///
    /// - While running, the config is held until the phase ends or is
    ///   stopped. A later update replaces an earlier pending one.
    /// - While paused in a focus phase that has not counted down at all, the
    ///   config takes effect and the remaining time is recomputed.
    /// - Otherwise the config takes effect for future phases only and the
    ///   current phase keeps its remaining time.
    pub fn apply_config(&mut self, config: SessionConfig) -> ApplyOutcome {
        if self.running {
            debug!(
                focus_minutes = config.focus_minutes(),
                rest_minutes = config.rest_minutes(),
                "Timer running, config deferred"
            );
            self.pending = Some(config);
            return ApplyOutcome::Deferred;
        }

        self.pending = None;
        self.config = config;
        if self.phase == Phase::Focus && self.elapsed_secs() == 0 {
            self.enter(Phase::Focus);
        }

        debug!(
            focus_minutes = config.focus_minutes(),
            rest_minutes = config.rest_minutes(),
            phase = %self.phase,
            remaining_secs = self.remaining_secs,
            "Config applied"
        );
        ApplyOutcome::Applied
    }

    fn promote_pending(&mut self) {
        if let Some(config) = self.pending.take() {
            debug!(
                focus_minutes = config.focus_minutes(),
                rest_minutes = config.rest_minutes(),
                "Promoting deferred config"
            );
            self.config = config;
        }
    }

    /// Enters `phase` at its full configured duration.
    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.planned_minutes = self.config.minutes_for(phase);
        self.remaining_secs = self.planned_secs();
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(SessionConfig::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(focus: u32, rest: u32) -> SessionConfig {
        SessionConfig::new(focus, rest).unwrap()
    }

    fn run_ticks(machine: &mut SessionMachine, ticks: u32) -> Vec<SessionRecord> {
        (0..ticks).filter_map(|_| machine.tick()).collect()
    }

    /// Checks the timing invariant that must hold between calls.
    fn assert_invariant(machine: &SessionMachine) {
        let state = machine.snapshot();
        assert!(state.remaining_secs > 0, "zero remaining observed at rest");
        assert!(state.remaining_secs <= state.planned_minutes * 60);
    }

    #[test]
    fn test_initial_state_is_paused_full_focus() {
        let machine = SessionMachine::new(config(25, 5));
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 1500);
        assert!(!machine.is_running());
    }

    #[test]
    fn test_start_and_pause_are_idempotent() {
        let mut machine = SessionMachine::default();
        assert!(machine.start());
        assert!(!machine.start());
        assert!(machine.is_running());

        assert!(machine.pause());
        let after_one = machine.snapshot();
        assert!(!machine.pause());
        assert_eq!(machine.snapshot(), after_one);
    }

    #[test]
    fn test_tick_ignored_while_paused() {
        let mut machine = SessionMachine::default();
        assert_eq!(machine.tick(), None);
        assert_eq!(machine.remaining_secs(), 1500);
    }

    #[test]
    fn test_tick_decrements_by_one() {
        let mut machine = SessionMachine::default();
        machine.start();
        machine.tick();
        assert_eq!(machine.remaining_secs(), 1499);
        assert_eq!(machine.display().clock, "24:59");
    }

    #[test]
    fn test_focus_expiry_emits_record_and_enters_paused_rest() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();

        let records = run_ticks(&mut machine, 1500);

        assert_eq!(
            records,
            vec![SessionRecord {
                is_focus: true,
                planned_minutes: 25,
                actual_minutes: 25,
            }]
        );
        assert_eq!(machine.phase(), Phase::Rest);
        assert_eq!(machine.remaining_secs(), 300);
        assert!(!machine.is_running());
    }

    #[test]
    fn test_rest_expiry_emits_rest_record() {
        let mut machine = SessionMachine::new(config(1, 2));
        machine.start();
        run_ticks(&mut machine, 60);
        machine.start();

        let records = run_ticks(&mut machine, 120);
        assert_eq!(records, vec![SessionRecord::completed(Phase::Rest, 2)]);
        assert!(!records[0].is_focus);
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 60);
    }

    #[test]
    fn test_phases_alternate_across_config_changes() {
        let mut machine = SessionMachine::new(config(1, 1));
        let mut phases = Vec::new();

        for round in 0..6u32 {
            machine.apply_config(config(1 + round % 2, 1 + round % 3));
            machine.start();
            loop {
                assert_invariant(&machine);
                if let Some(record) = machine.tick() {
                    phases.push(if record.is_focus { Phase::Focus } else { Phase::Rest });
                    break;
                }
            }
        }

        assert_eq!(
            phases,
            vec![
                Phase::Focus,
                Phase::Rest,
                Phase::Focus,
                Phase::Rest,
                Phase::Focus,
                Phase::Rest
            ]
        );
    }

    #[test]
    fn test_stop_and_save_records_whole_minutes() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 90);

        let record = machine.stop_and_save().unwrap();
        assert_eq!(record, SessionRecord::stopped_early(25, 1));
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 1500);
        assert!(!machine.is_running());
    }

    #[test]
    fn test_stop_and_save_under_a_minute_is_rejected() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 59);

        let err = machine.stop_and_save().unwrap_err();
        assert_eq!(err, SessionError::InsufficientDuration { elapsed_secs: 59 });
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 1500);
        assert!(!machine.is_running());
    }

    #[test]
    fn test_stop_and_save_at_exactly_one_minute() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 60);
        assert_eq!(machine.stop_and_save().unwrap().actual_minutes, 1);
    }

    #[test]
    fn test_stop_and_save_during_rest_returns_to_paused_focus() {
        let mut machine = SessionMachine::new(config(1, 5));
        machine.start();
        run_ticks(&mut machine, 60);
        machine.start();
        run_ticks(&mut machine, 10);
        assert_eq!(machine.phase(), Phase::Rest);
        assert_eq!(machine.remaining_secs(), 290);

        assert_eq!(machine.stop_and_save(), Err(SessionError::NotFocusing));
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 60);
        assert!(!machine.is_running());
        assert_invariant(&machine);
    }

    #[test]
    fn test_stop_and_save_during_rest_promotes_pending_config() {
        let mut machine = SessionMachine::new(config(1, 5));
        machine.start();
        run_ticks(&mut machine, 60);
        machine.start();
        assert_eq!(machine.apply_config(config(2, 3)), ApplyOutcome::Deferred);

        assert_eq!(machine.stop_and_save(), Err(SessionError::NotFocusing));
        assert_eq!(machine.config(), config(2, 3));
        assert_eq!(machine.pending_config(), None);
        assert_eq!(machine.remaining_secs(), 120);
    }

    #[test]
    fn test_reset_returns_to_full_focus_without_record() {
        let mut machine = SessionMachine::new(config(1, 5));
        machine.start();
        run_ticks(&mut machine, 60);
        machine.start();
        run_ticks(&mut machine, 30);

        machine.reset();
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 60);
        assert!(!machine.is_running());
    }

    #[test]
    fn test_apply_config_on_fresh_paused_focus_updates_remaining() {
        let mut machine = SessionMachine::new(config(25, 5));
        assert_eq!(machine.apply_config(config(30, 10)), ApplyOutcome::Applied);
        assert_eq!(machine.remaining_secs(), 1800);
        assert_eq!(machine.snapshot().planned_minutes, 30);
    }

    #[test]
    fn test_apply_config_keeps_elapsed_focus_time() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 120);
        machine.pause();

        assert_eq!(machine.apply_config(config(40, 8)), ApplyOutcome::Applied);
        assert_eq!(machine.remaining_secs(), 1380);
        assert_eq!(machine.snapshot().planned_minutes, 25);

        // The focus phase still finishes at its original length.
        machine.start();
        let records = run_ticks(&mut machine, 1380);
        assert_eq!(records, vec![SessionRecord::completed(Phase::Focus, 25)]);
        assert_eq!(machine.remaining_secs(), 8 * 60);
    }

    #[test]
    fn test_apply_config_during_rest_applies_to_next_focus() {
        let mut machine = SessionMachine::new(config(1, 5));
        machine.start();
        run_ticks(&mut machine, 60);
        assert_eq!(machine.phase(), Phase::Rest);

        machine.apply_config(config(30, 10));
        assert_eq!(machine.remaining_secs(), 300);

        machine.start();
        let records = run_ticks(&mut machine, 300);
        assert_eq!(records, vec![SessionRecord::completed(Phase::Rest, 5)]);
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 1800);
    }

    #[test]
    fn test_apply_config_while_running_is_deferred_until_expiry() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 10);

        assert_eq!(machine.apply_config(config(30, 10)), ApplyOutcome::Deferred);
        assert_eq!(machine.remaining_secs(), 1490);
        assert_eq!(machine.config(), config(25, 5));
        assert_eq!(machine.pending_config(), Some(config(30, 10)));

        let records = run_ticks(&mut machine, 1490);
        // The completed phase is reported with its own length.
        assert_eq!(records, vec![SessionRecord::completed(Phase::Focus, 25)]);
        assert_eq!(machine.remaining_secs(), 600);
        assert_eq!(machine.pending_config(), None);

        machine.start();
        run_ticks(&mut machine, 600);
        assert_eq!(machine.phase(), Phase::Focus);
        assert_eq!(machine.remaining_secs(), 1800);
    }

    #[test]
    fn test_latest_deferred_config_wins() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        machine.apply_config(config(30, 10));
        machine.apply_config(config(20, 4));
        machine.reset();
        assert_eq!(machine.remaining_secs(), 1200);
    }

    #[test]
    fn test_deferred_config_promoted_on_stop_and_save() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        run_ticks(&mut machine, 180);
        machine.apply_config(config(45, 9));

        let record = machine.stop_and_save().unwrap();
        assert_eq!(record, SessionRecord::stopped_early(25, 3));
        assert_eq!(machine.remaining_secs(), 45 * 60);
    }

    #[test]
    fn test_pause_does_not_promote_deferred_config() {
        let mut machine = SessionMachine::new(config(25, 5));
        machine.start();
        machine.apply_config(config(30, 10));
        machine.pause();
        assert_eq!(machine.pending_config(), Some(config(30, 10)));
        assert_eq!(machine.remaining_secs(), 1500);
    }

    #[test]
    fn test_remaining_never_observed_at_zero() {
        let mut machine = SessionMachine::new(config(1, 1));
        for _ in 0..10 {
            machine.start();
            for _ in 0..60 {
                machine.tick();
                assert_invariant(&machine);
            }
        }
    }
}
