//! Pomoisle Timer - focus/rest session timer.
//!
//! This binary runs one interactive timer session against the
//! recommendation service.
//!
//! # Commands
//!
//! - `pomoisle-timer run`: Start an interactive session
//! - `pomoisle-timer recommend`: Fetch and print the current recommendation
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pomoisle_timer::client::{
    ClientConfig, HttpRecommendationClient, RecommendationService, RetryPolicy,
};
use pomoisle_timer::clock::IntervalClock;
use pomoisle_timer::config::Config;
use pomoisle_timer::controller::{Command as TimerCommand, SessionController};
use pomoisle_timer::types::{Notice, SessionConfig, SessionRecord, TimerDisplay};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// How long to wait for blocking tasks when the runtime shuts down.
const RUNTIME_SHUTDOWN_MILLIS: u64 = 100;

/// Capacity of the user command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Pomoisle Timer - focus/rest session timer.
///
/// Alternates focus and rest phases, reports each finished session to the
/// recommendation service and adapts the next durations from its answer.
#[derive(Parser, Debug)]
#[command(name = "pomoisle-timer")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    POMOISLE_SERVER_URL            Service URL (default: http://127.0.0.1:5000/api)
    POMOISLE_THEME                 study, exercise or work (default: study)
    POMOISLE_TICK_MILLIS           Clock period in ms (default: 1000)
    POMOISLE_REQUEST_TIMEOUT_SECS  HTTP timeout (default: 10)
    POMOISLE_FETCH_RETRY_LIMIT     Fetch attempts, 1-10 (default: 3)

SESSION COMMANDS (type and press Enter):
    s  start      p  pause      <Enter>  toggle
    x  stop and save focus      r  reset      q  quit

EXAMPLES:
    # Start a session against a local service
    pomoisle-timer run

    # Fast-forward for a demo (one timer second every 10ms)
    POMOISLE_TICK_MILLIS=10 pomoisle-timer run
")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive timer session.
    Run,

    /// Fetch the current recommendation and print it.
    ///
    /// Prints the 25/5 fallback if the service cannot be reached.
    Recommend,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = match cli.command {
        Command::Run => runtime.block_on(run_session()),
        Command::Recommend => runtime.block_on(run_recommend()),
    };

    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(RUNTIME_SHUTDOWN_MILLIS));
    result
}

/// Builds the HTTP client from configuration.
fn build_client(config: &Config) -> pomoisle_timer::Result<HttpRecommendationClient> {
    let mut client_config = ClientConfig::new(config.server_url.clone(), config.theme)
        .with_request_timeout(config.request_timeout);
    client_config.fetch_retry = RetryPolicy::with_max_attempts(config.fetch_retry_limit);

    Ok(HttpRecommendationClient::new(client_config)?)
}

/// Runs the recommend command.
async fn run_recommend() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let client = build_client(&config).context("Failed to create HTTP client")?;

    match client.fetch_recommendation().await {
        Ok(rec) => {
            println!(
                "focus {}m / rest {}m",
                rec.config.focus_minutes(),
                rec.config.rest_minutes()
            );
            if !rec.message.is_empty() {
                println!("{}", rec.message);
            }
        }
        Err(e) => {
            let fallback = SessionConfig::DEFAULT;
            println!(
                "focus {}m / rest {}m (default)",
                fallback.focus_minutes(),
                fallback.rest_minutes()
            );
            eprintln!("{}", Notice::FellBackToDefault { reason: e.to_string() });
        }
    }

    Ok(())
}

/// Runs an interactive session.
async fn run_session() -> Result<()> {
    info!("Starting Pomoisle Timer");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        server_url = %config.server_url,
        theme = %config.theme,
        tick_ms = config.tick_period.as_millis(),
        "Configuration loaded"
    );

    let client = Arc::new(build_client(&config).context("Failed to create HTTP client")?);
    let mut controller = SessionController::new(client);

    let renderer = tokio::spawn(render(
        controller.subscribe_display(),
        controller.subscribe_progress(),
        controller.subscribe_session_end(),
        controller.subscribe_notices(),
    ));

    let (command_tx, command_rx) = mpsc::channel::<TimerCommand>(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(read_commands(command_tx.clone()));
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        let _ = command_tx.send(TimerCommand::Shutdown).await;
    });

    controller.bootstrap();
    controller
        .run(IntervalClock::new(config.tick_period), command_rx)
        .await;

    // Graceful shutdown
    info!("Shutting down...");

    let unresolved = controller
        .shutdown(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS))
        .await;

    if unresolved > 0 {
        error!(
            unresolved_calls = unresolved,
            "Some sessions may not have been recorded"
        );
    }

    renderer.abort();
    println!();
    println!("Total focus: {} minutes", controller.progress_total());

    info!("Timer stopped");
    Ok(())
}

/// Reads line commands from stdin until it closes or `q` is entered.
async fn read_commands(tx: mpsc::Sender<TimerCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                let _ = tx.send(TimerCommand::Shutdown).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                let _ = tx.send(TimerCommand::Shutdown).await;
                return;
            }
        };

        match line.parse::<TimerCommand>() {
            Ok(command) => {
                if tx.send(command).await.is_err() || command == TimerCommand::Shutdown {
                    return;
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// Writes the timer state to stdout as it changes.
async fn render(
    mut display: watch::Receiver<TimerDisplay>,
    mut progress: watch::Receiver<u32>,
    mut session_end: broadcast::Receiver<SessionRecord>,
    mut notices: broadcast::Receiver<Notice>,
) {
    draw_status(&display.borrow_and_update(), *progress.borrow_and_update());

    loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            record = session_end.recv() => {
                if let Ok(record) = record {
                    let kind = if record.is_focus { "Focus" } else { "Rest" };
                    println!("\r\x1b[K{kind} finished: {}m of {}m", record.actual_minutes, record.planned_minutes);
                }
            }
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    println!("\r\x1b[K! {notice}");
                }
            }
        }

        draw_status(&display.borrow_and_update(), *progress.borrow_and_update());
    }
}

/// Redraws the single status line.
fn draw_status(display: &TimerDisplay, total_minutes: u32) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "\r\x1b[K{display}  total focus {total_minutes}m > ");
    let _ = stdout.flush();
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr so the status line on stdout stays readable.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        builder.json().with_file(false).with_line_number(false).init();
    } else {
        builder.init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
