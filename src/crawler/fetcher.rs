//! Page fetching with retry
//!
//! This module handles every page request the crawler makes:
//! - The [`PageSource`] seam (one attempt at retrieving a page)
//! - The plain HTTP source built on `reqwest`
//! - Linear backoff retry with an attempt trace
//! - Optional request spacing shared with other fetchers
//! - Cooperative cancellation between attempts

use crate::config::FetchConfig;
use crate::crawler::gate::RequestGate;
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Failure of a single attempt
///
/// Every variant is retryable: the fetcher decides when to give up.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("browser error: {0}")]
    Browser(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else if e.is_body() || e.is_decode() {
            SourceError::Body(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// One way of retrieving a page (plain HTTP, remote browser)
///
/// Implementations make exactly one attempt per call and enforce their own
/// timeout.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Retrieves the page content at `url`
    async fn get_page(&self, url: &Url) -> Result<String, SourceError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Releases any resources held by the source
    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { bytes: usize },
    Retryable(String),
    Fatal(String),
}

/// Record of one attempt at fetching a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub url: String,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
}

/// Terminal fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("gave up on {url} after {} attempts: {last_error}", .attempts.len())]
    Exhausted {
        url: String,
        attempts: Vec<FetchAttempt>,
        last_error: String,
    },

    #[error("fetch of {url} was cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// Attempt trace, empty unless the retries ran out
    pub fn attempts(&self) -> &[FetchAttempt] {
        match self {
            FetchError::Exhausted { attempts, .. } => attempts,
            _ => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Retry ceiling and backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per URL, including the first one
    pub max_retries: u32,

    /// Attempt `n` failing is followed by a pause of `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Pause after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Builds an HTTP client with the configured headers and timeout
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(HarvestError)` - A header value was invalid or the client failed to build
///
/// # Example
///
/// ```no_run
/// use listing_harvester::config::FetchConfig;
/// use listing_harvester::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (USER_AGENT, &config.user_agent),
        (ACCEPT, &config.accept),
        (ACCEPT_LANGUAGE, &config.accept_language),
    ] {
        let value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("invalid {} header: {}", name, e))
        })?;
        headers.insert(name, value);
    }

    let client = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Plain HTTP page source
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, HarvestError> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn get_page(&self, url: &Url) -> Result<String, SourceError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Body(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// A page source wrapped with retry and cancellation
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn PageSource>,
    policy: RetryPolicy,
    gate: Option<Arc<RequestGate>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("source", &self.source.name())
            .field("policy", &self.policy)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl Fetcher {
    pub fn new(source: Arc<dyn PageSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            gate: None,
        }
    }

    /// Makes every attempt, retries included, wait its turn at `gate`
    pub fn with_gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches a URL, retrying until it succeeds or the attempts run out
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_cancel(url, &CancellationToken::new()).await
    }

    /// Fetches a URL with cooperative cancellation
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | URL does not parse, or is not http(s) | Immediate `InvalidUrl`, no attempt |
    /// | Attempt `n` fails, `n < max_retries` | Wait `base_delay * n`, retry |
    /// | Attempt `max_retries` fails | `Exhausted` with one trace entry per attempt |
    /// | Token cancelled | `Cancelled` (checked before each attempt, raced against the gate wait and the backoff) |
    ///
    /// An attempt that has started always runs to completion; cancellation
    /// takes effect at the next check.
    pub async fn fetch_with_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let target = parse_target(url)?;
        let max_retries = self.policy.max_retries.max(1);
        let mut attempts = Vec::with_capacity(max_retries as usize);

        for attempt_number in 1..=max_retries {
            if cancel.is_cancelled() {
                return Err(cancelled(url));
            }

            if let Some(gate) = &self.gate {
                if !gate.wait_turn(cancel).await {
                    return Err(cancelled(url));
                }
            }

            tracing::info!(
                "Fetching {} via {} (attempt {}/{})",
                url,
                self.source.name(),
                attempt_number,
                max_retries
            );

            match self.source.get_page(&target).await {
                Ok(body) => {
                    attempts.push(FetchAttempt {
                        url: url.to_string(),
                        attempt_number,
                        outcome: AttemptOutcome::Success { bytes: body.len() },
                    });
                    tracing::debug!(?attempts, "Fetched {}", url);
                    return Ok(body);
                }
                Err(e) if attempt_number == max_retries => {
                    let last_error = e.to_string();
                    tracing::error!(
                        "Giving up on {} after {} attempts: {}",
                        url,
                        max_retries,
                        last_error
                    );
                    attempts.push(FetchAttempt {
                        url: url.to_string(),
                        attempt_number,
                        outcome: AttemptOutcome::Fatal(last_error.clone()),
                    });
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        last_error,
                    });
                }
                Err(e) => {
                    let delay = self.policy.backoff(attempt_number);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt_number,
                        max_retries,
                        url,
                        e,
                        delay
                    );
                    attempts.push(FetchAttempt {
                        url: url.to_string(),
                        attempt_number,
                        outcome: AttemptOutcome::Retryable(e.to_string()),
                    });

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(cancelled(url)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // max_retries >= 1, so the loop always returns
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last_error: "no attempt made".to_string(),
        })
    }

    /// Releases the underlying source
    pub async fn close(&self) -> Result<(), SourceError> {
        self.source.close().await
    }
}

fn cancelled(url: &str) -> FetchError {
    tracing::info!("Fetch of {} cancelled", url);
    FetchError::Cancelled {
        url: url.to_string(),
    }
}

/// Parses a fetch target, accepting only http and https
fn parse_target(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}
