//! Single-writer event loop for one timer session.
//!
//! The [`SessionController`] owns the state machine, the recommendation
//! adapter and the progress aggregator. All mutation happens on the task
//! that drives it, so no locks are needed:
//!
//! - clock ticks and user [`Command`]s are applied synchronously, each to
//!   completion before the next event is handled
//! - network calls run on spawned tasks and report back as
//!   [`NetworkOutcome`] messages, which are applied on the controller's task
//!   in arrival order
//!
//! When a phase ends the record is broadcast to subscribers and posted to
//! the recommendation service. A focus record that the service acknowledges
//! is credited to the progress total and triggers exactly one follow-up
//! fetch. A failed post is logged and dropped without credit.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapter::{FetchTicket, RecommendationAdapter};
use crate::client::{ClientError, RecommendationService};
use crate::clock::TickSource;
use crate::error::SessionError;
use crate::machine::SessionMachine;
use crate::progress::ProgressAggregator;
use crate::types::{Notice, Recommendation, SessionConfig, SessionRecord, TimerDisplay};

/// Capacity of the session-end and notice broadcast channels.
const BROADCAST_CAPACITY: usize = 64;

/// User actions accepted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    /// Start if paused, pause if running.
    Toggle,
    StopAndSave,
    Reset,
    /// Leave the event loop.
    Shutdown,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "start" => Ok(Self::Start),
            "p" | "pause" => Ok(Self::Pause),
            "" | "t" | "toggle" => Ok(Self::Toggle),
            "x" | "stop" => Ok(Self::StopAndSave),
            "r" | "reset" => Ok(Self::Reset),
            "q" | "quit" | "exit" => Ok(Self::Shutdown),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Result of a network call, delivered back to the controller's task.
#[derive(Debug)]
pub enum NetworkOutcome {
    Fetched {
        ticket: FetchTicket,
        result: Result<Recommendation, ClientError>,
    },
    Posted {
        record: SessionRecord,
        result: Result<(), ClientError>,
    },
}

/// Owns and drives one timer session.
pub struct SessionController<S> {
    service: Arc<S>,
    machine: SessionMachine,
    adapter: RecommendationAdapter,
    progress: ProgressAggregator,
    outcome_tx: mpsc::UnboundedSender<NetworkOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<NetworkOutcome>,
    posts_in_flight: usize,
    display_tx: watch::Sender<TimerDisplay>,
    session_end_tx: broadcast::Sender<SessionRecord>,
    notice_tx: broadcast::Sender<Notice>,
    notices: Vec<Notice>,
}

impl<S> SessionController<S>
where
    S: RecommendationService + 'static,
{
    /// Creates a controller starting from the default 25/5 config.
    #[must_use]
    pub fn new(service: Arc<S>) -> Self {
        Self::with_config(service, SessionConfig::DEFAULT)
    }

    #[must_use]
    pub fn with_config(service: Arc<S>, config: SessionConfig) -> Self {
        let machine = SessionMachine::new(config);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (display_tx, _) = watch::channel(machine.display());
        let (session_end_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (notice_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            service,
            machine,
            adapter: RecommendationAdapter::new(),
            progress: ProgressAggregator::new(),
            outcome_tx,
            outcome_rx,
            posts_in_flight: 0,
            display_tx,
            session_end_tx,
            notice_tx,
            notices: Vec::new(),
        }
    }

    // ── Read-only views ──────────────────────────────────────────────

    #[must_use]
    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    #[must_use]
    pub fn display(&self) -> TimerDisplay {
        self.machine.display()
    }

    /// Acknowledged focus minutes so far.
    #[must_use]
    pub fn progress_total(&self) -> u32 {
        self.progress.total()
    }

    /// Message attached to the latest applied recommendation.
    #[must_use]
    pub fn recommendation_message(&self) -> Option<&str> {
        self.adapter.message()
    }

    /// Network calls started but not yet applied.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.adapter.in_flight().saturating_add(self.posts_in_flight)
    }

    #[must_use]
    pub fn subscribe_display(&self) -> watch::Receiver<TimerDisplay> {
        self.display_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<u32> {
        self.progress.subscribe()
    }

    /// Receives every record emitted when a phase ends.
    #[must_use]
    pub fn subscribe_session_end(&self) -> broadcast::Receiver<SessionRecord> {
        self.session_end_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Takes the notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ── Event handling ───────────────────────────────────────────────

    /// Issues the startup recommendation fetch.
    pub fn bootstrap(&mut self) -> FetchTicket {
        info!(
            focus_minutes = self.machine.config().focus_minutes(),
            rest_minutes = self.machine.config().rest_minutes(),
            "Session starting, fetching recommendation"
        );
        self.spawn_fetch()
    }

    /// Applies one clock tick.
    pub fn handle_tick(&mut self) -> Option<SessionRecord> {
        let record = self.machine.tick();
        if let Some(record) = record {
            self.emit(record);
        }
        self.publish_display();
        record
    }

    /// Applies one user command.
    ///
    /// # Errors
    ///
    /// Propagates the machine's rejection of `StopAndSave`. Every other
    /// command always succeeds.
    pub fn handle_command(&mut self, command: Command) -> Result<(), SessionError> {
        debug!(?command, "Handling command");
        let result = match command {
            Command::Start => {
                self.machine.start();
                Ok(())
            }
            Command::Pause => {
                self.machine.pause();
                Ok(())
            }
            Command::Toggle => {
                if self.machine.is_running() {
                    self.machine.pause();
                } else {
                    self.machine.start();
                }
                Ok(())
            }
            Command::StopAndSave => self.stop_and_save(),
            Command::Reset => {
                self.machine.reset();
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };
        self.publish_display();
        result
    }

    fn stop_and_save(&mut self) -> Result<(), SessionError> {
        match self.machine.stop_and_save() {
            Ok(record) => {
                self.emit(record);
                Ok(())
            }
            Err(e) => {
                if let SessionError::InsufficientDuration { elapsed_secs } = e {
                    self.raise(Notice::FocusTooShort { elapsed_secs });
                }
                debug!(error = %e, "Stop-and-save rejected");
                Err(e)
            }
        }
    }

    /// Applies the result of a network call.
    pub fn handle_outcome(&mut self, outcome: NetworkOutcome) {
        match outcome {
            NetworkOutcome::Fetched { ticket, result } => {
                let (_, notice) = self.adapter.resolve(ticket, result, &mut self.machine);
                if let Some(notice) = notice {
                    self.raise(notice);
                }
            }
            NetworkOutcome::Posted { record, result } => {
                self.posts_in_flight = self.posts_in_flight.saturating_sub(1);
                match result {
                    Ok(()) if record.is_focus => {
                        self.progress.credit(record.actual_minutes);
                        self.spawn_fetch();
                    }
                    Ok(()) => {
                        debug!("Rest session acknowledged");
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            is_focus = record.is_focus,
                            actual_minutes = record.actual_minutes,
                            "Failed to record session, dropping it"
                        );
                        self.raise(Notice::SessionDropped {
                            record,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        self.publish_display();
    }

    /// Waits for every in-flight network call, including follow-up fetches
    /// they trigger, and applies the results.
    pub async fn settle(&mut self) {
        while self.in_flight() > 0 {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.handle_outcome(outcome),
                None => break,
            }
        }
    }

    /// Runs the event loop until a `Shutdown` command, the command channel
    /// closing, or the clock being exhausted.
    pub async fn run<C: TickSource>(&mut self, mut clock: C, mut commands: mpsc::Receiver<Command>) {
        info!("Timer loop running");

        loop {
            tokio::select! {
                biased;

                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }

                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed");
                        break;
                    };
                    if command == Command::Shutdown {
                        info!("Shutdown requested");
                        break;
                    }
                    let was_running = self.machine.is_running();
                    if let Err(e) = self.handle_command(command) {
                        debug!(error = %e, ?command, "Command rejected");
                    }
                    if !was_running && self.machine.is_running() {
                        clock.restart();
                    }
                }

                tick = clock.next_tick() => {
                    if tick.is_none() {
                        debug!("Clock exhausted");
                        break;
                    }
                    self.handle_tick();
                }
            }
        }
    }

    /// Gives in-flight network calls up to `timeout` to finish.
    ///
    /// Returns the number of calls still unresolved.
    pub async fn shutdown(&mut self, timeout: Duration) -> usize {
        if self.in_flight() == 0 {
            return 0;
        }

        info!(in_flight = self.in_flight(), "Waiting for network calls before shutdown");
        if tokio::time::timeout(timeout, self.settle()).await.is_err() {
            error!("Timeout while waiting for network calls during shutdown");
        }
        self.in_flight()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn emit(&mut self, record: SessionRecord) {
        // No subscribers is fine; presentation is optional.
        let _ = self.session_end_tx.send(record);
        self.spawn_post(record);
    }

    fn raise(&mut self, notice: Notice) {
        info!(%notice, "Notice");
        let _ = self.notice_tx.send(notice.clone());
        self.notices.push(notice);
    }

    fn publish_display(&self) {
        let display = self.machine.display();
        self.display_tx.send_if_modified(|current| {
            if *current == display {
                return false;
            }
            *current = display;
            true
        });
    }

    fn spawn_fetch(&mut self) -> FetchTicket {
        let ticket = self.adapter.begin_fetch();
        let service = Arc::clone(&self.service);
        let tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let call = tokio::spawn(async move { service.fetch_recommendation().await });
            let result = join_call(call).await;
            // The receiver lives as long as the controller.
            let _ = tx.send(NetworkOutcome::Fetched { ticket, result });
        });
        ticket
    }

    fn spawn_post(&mut self, record: SessionRecord) {
        self.posts_in_flight += 1;
        let service = Arc::clone(&self.service);
        let tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let call = tokio::spawn(async move { service.post_session(record).await });
            let result = join_call(call).await;
            let _ = tx.send(NetworkOutcome::Posted { record, result });
        });
    }
}

/// Awaits a spawned service call, turning a panicked or cancelled task into
/// an error so every started call reports back exactly once.
async fn join_call<T>(call: JoinHandle<Result<T, ClientError>>) -> Result<T, ClientError> {
    match call.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Service call task failed");
            Err(ClientError::Aborted(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parsing_accepts_short_and_long_forms() {
        assert_eq!("s".parse::<Command>().unwrap(), Command::Start);
        assert_eq!("Pause".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!("".parse::<Command>().unwrap(), Command::Toggle);
        assert_eq!(" x ".parse::<Command>().unwrap(), Command::StopAndSave);
        assert_eq!("reset".parse::<Command>().unwrap(), Command::Reset);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Shutdown);
    }

    #[test]
    fn command_parsing_rejects_unknown() {
        let err = "launch".parse::<Command>().unwrap_err();
        assert_eq!(err, "unknown command 'launch'");
    }
}
