//! HTTP client for the recommendation service.
//!
//! The service exposes two calls:
//!
//! - `GET {base}/session/recommendation?theme=...` returns the next focus and
//!   rest durations
//! - `POST {base}/session/end` records a finished session
//!
//! Failures are classified by [`ClientError`]. The client owns the retry
//! policy: the idempotent fetch retries on connection errors, timeouts and
//! 5xx responses with exponential backoff (±25% jitter). A session post is
//! only retried when the connection could not be established, so the service
//! never receives the same record twice. Falling back to default durations
//! is the caller's job.
//!
//! # Example
//!
//! ```no_run
//! use pomoisle_timer::client::{ClientConfig, HttpRecommendationClient, RecommendationService};
//! use pomoisle_timer::types::Theme;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::new("http://127.0.0.1:5000/api".to_string(), Theme::Study);
//!     let client = HttpRecommendationClient::new(config).unwrap();
//!
//!     match client.fetch_recommendation().await {
//!         Ok(rec) => println!("focus for {} minutes", rec.config.focus_minutes()),
//!         Err(e) => eprintln!("falling back to defaults: {e}"),
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::types::{Recommendation, RecommendationPayload, SessionEndBody, SessionRecord, Theme};

/// Initial retry delay in milliseconds.
const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Maximum retry delay in milliseconds.
const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// Default number of attempts per call.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default HTTP request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors returned by the recommendation service calls.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (connection refused, timeout, TLS...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("server error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// The response decoded but carried unusable durations.
    #[error(transparent)]
    InvalidConfig(#[from] SessionError),

    /// The task running the call ended without producing a result.
    #[error("call aborted: {0}")]
    Aborted(String),
}

impl ClientError {
    /// Returns true if the call did not complete, as opposed to completing
    /// with a payload the timer refuses.
    #[must_use]
    pub fn is_network_failure(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_))
    }
}

/// Backoff policy for retried calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given attempt count and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Millisecond delays so tests exercising retries stay fast.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    /// Returns the backoff before attempt `attempt + 1`, without jitter.
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// The calls the timer makes against the recommendation service.
///
/// Futures are `Send` so the controller can run them on spawned tasks while
/// the timer keeps ticking.
pub trait RecommendationService: Send + Sync {
    /// Fetches the current recommended durations.
    fn fetch_recommendation(
        &self,
    ) -> impl Future<Output = Result<Recommendation, ClientError>> + Send;

    /// Reports a finished session.
    fn post_session(
        &self,
        record: SessionRecord,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Configuration for [`HttpRecommendationClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without a trailing slash (e.g., `http://127.0.0.1:5000/api`).
    pub base_url: String,

    /// Theme sent with every request.
    pub theme: Theme,

    pub request_timeout: Duration,

    /// Policy applied to recommendation fetches.
    pub fetch_retry: RetryPolicy,

    /// Policy applied to session posts (connection errors only).
    pub post_retry: RetryPolicy,
}

impl ClientConfig {
    /// Creates a configuration with default timeout and retry policies.
    #[must_use]
    pub fn new(base_url: String, theme: Theme) -> Self {
        Self {
            base_url,
            theme,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            fetch_retry: RetryPolicy::default(),
            post_retry: RetryPolicy::default(),
        }
    }

    /// Overrides both retry policies.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self.post_retry = policy;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// `reqwest`-backed recommendation client.
#[derive(Debug, Clone)]
pub struct HttpRecommendationClient {
    config: ClientConfig,
    client: Client,
}

impl HttpRecommendationClient {
    /// Creates a client with a pooled HTTP connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { config, client })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn recommendation_url(&self) -> String {
        format!("{}/session/recommendation", self.config.base_url)
    }

    fn session_end_url(&self) -> String {
        format!("{}/session/end", self.config.base_url)
    }

    /// Performs one GET and decodes the payload.
    async fn fetch_once(&self) -> Result<Recommendation, ClientError> {
        let response = self
            .client
            .get(self.recommendation_url())
            .query(&[("theme", self.config.theme.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let payload: RecommendationPayload = serde_json::from_slice(&body)
            .map_err(|e| ClientError::MalformedBody(e.to_string()))?;

        Ok(Recommendation::try_from(payload)?)
    }

    /// Performs one POST; the response body is not consumed.
    async fn post_once(&self, body: &SessionEndBody) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.session_end_url())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl RecommendationService for HttpRecommendationClient {
    async fn fetch_recommendation(&self) -> Result<Recommendation, ClientError> {
        let policy = self.config.fetch_retry;
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(url = %self.recommendation_url(), attempt = attempts, "Fetching recommendation");

            match self.fetch_once().await {
                Ok(rec) => {
                    info!(
                        focus_minutes = rec.config.focus_minutes(),
                        rest_minutes = rec.config.rest_minutes(),
                        "Recommendation received"
                    );
                    return Ok(rec);
                }
                Err(e) if is_retryable_fetch(&e) && attempts < policy.max_attempts => {
                    warn!(error = %e, attempt = attempts, "Recommendation fetch failed, will retry");
                    wait_with_backoff(&policy, attempts).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_session(&self, record: SessionRecord) -> Result<(), ClientError> {
        let policy = self.config.post_retry;
        let body = SessionEndBody::new(&record, self.config.theme);
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                url = %self.session_end_url(),
                is_focus = record.is_focus,
                actual_minutes = record.actual_minutes,
                attempt = attempts,
                "Posting session"
            );

            match self.post_once(&body).await {
                Ok(()) => {
                    info!(
                        is_focus = record.is_focus,
                        actual_minutes = record.actual_minutes,
                        "Session recorded"
                    );
                    return Ok(());
                }
                Err(ClientError::Http(e)) if e.is_connect() && attempts < policy.max_attempts => {
                    warn!(error = %e, attempt = attempts, "Connection error posting session, will retry");
                    wait_with_backoff(&policy, attempts).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether a failed fetch is worth another attempt.
fn is_retryable_fetch(error: &ClientError) -> bool {
    match error {
        ClientError::Http(e) => e.is_connect() || e.is_timeout(),
        ClientError::Status { status, .. } => StatusCode::from_u16(*status)
            .map(|s| s.is_server_error())
            .unwrap_or(false),
        ClientError::MalformedBody(_)
        | ClientError::InvalidConfig(_)
        | ClientError::Aborted(_) => false,
    }
}

/// Sleeps for the policy's backoff after `attempt`, with jitter.
async fn wait_with_backoff(policy: &RetryPolicy, attempt: u32) {
    let delay = add_jitter(policy.delay_after(attempt));
    debug!(delay_ms = delay.as_millis(), "Waiting before retry");
    sleep(delay).await;
}

/// Adds ±25% jitter to a duration.
fn add_jitter(duration: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * JITTER_FACTOR;
    if jitter_range <= 0.0 {
        return duration;
    }
    let jitter = rng.random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.0))
}
