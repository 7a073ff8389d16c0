//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the pipeline, including:
//! - Building the shared HTTP client (user agent, trust root, timeouts)
//! - Classifying failures as retryable or terminal
//! - Linear backoff between attempts

use crate::config::{HttpConfig, RetryConfig};
use crate::ScrapeError;
use reqwest::{Certificate, Client, StatusCode};
use std::error::Error as _;
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// A completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch failures surfaced to callers
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url} after {attempts} attempts")]
    StatusExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("request to {url} failed after {attempts} attempts: {source}")]
    TransportExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Why a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// HTTP 429
    RateLimited,
    /// HTTP 500, 502, 503 or 504
    ServerError,
    /// Timeout or aborted/reset connection
    Transport,
}

/// Attempt budget and linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    ///
    /// 429 waits `attempt * 2` units, everything else `attempt` units.
    pub fn backoff(&self, attempt: u32, reason: RetryReason) -> Duration {
        let units = match reason {
            RetryReason::RateLimited => attempt * 2,
            RetryReason::ServerError | RetryReason::Transport => attempt,
        };
        self.backoff_unit * units
    }
}

/// Classifies a status code
///
/// | Status | Classification |
/// |--------|----------------|
/// | 429 | retry, rate limited |
/// | 500, 502, 503, 504 | retry, server error |
/// | anything else | terminal |
pub fn classify_status(status: StatusCode) -> Option<RetryReason> {
    match status.as_u16() {
        429 => Some(RetryReason::RateLimited),
        500 | 502 | 503 | 504 => Some(RetryReason::ServerError),
        _ => None,
    }
}

/// Classifies a transport error
///
/// Timeouts and connections that were aborted, reset or timed out at the
/// socket are retried. DNS failures, refused connections and TLS errors are
/// terminal.
pub fn classify_error(err: &reqwest::Error) -> Option<RetryReason> {
    if err.is_timeout() {
        return Some(RetryReason::Transport);
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::TimedOut | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
            ) {
                return Some(RetryReason::Transport);
            }
        }
        source = cause.source();
    }

    None
}

/// Builds the HTTP client shared by every job
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(ScrapeError)` - The trust root could not be read or the client failed to build
pub fn build_http_client(config: &HttpConfig) -> Result<Client, ScrapeError> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    if let Some(path) = &config.ca_cert {
        let pem = std::fs::read(path)?;
        let certificate = Certificate::from_pem(&pem)?;
        builder = builder.add_root_certificate(certificate);
        tracing::debug!("Trusting additional root certificate from {}", path);
    }

    Ok(builder.build()?)
}

/// GETs pages, retrying transient failures
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: Client,
    policy: RetryPolicy,
}

enum Attempt {
    Done(FetchOutcome),
    Retry(RetryReason, FetchError),
    Fail(FetchError),
}

impl RetryingFetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `url`
    ///
    /// Non-success statuses that are not retried come back as `Ok` so the
    /// caller can decide what to do with them.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.fetch_observed(url, |_| {}).await
    }

    /// Fetches `url`, calling `on_attempt` with the 1-based attempt number
    /// before each request
    pub async fn fetch_observed(
        &self,
        url: &str,
        mut on_attempt: impl FnMut(u32) + Send,
    ) -> Result<FetchOutcome, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            on_attempt(attempt);

            let (reason, error) = match self.attempt(url, attempt).await {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(reason, error) => (reason, error),
            };

            if attempt >= self.policy.max_attempts {
                tracing::warn!("All {} attempts failed for {}", attempt, url);
                return Err(error);
            }

            let delay = self.policy.backoff(attempt, reason);
            tracing::warn!(
                "Attempt {} failed for {}: {}. Retrying in {:?}",
                attempt,
                url,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(url, attempt, e),
        };

        let status = response.status();
        if let Some(reason) = classify_status(status) {
            return Attempt::Retry(
                reason,
                FetchError::StatusExhausted {
                    url: url.to_string(),
                    status: status.as_u16(),
                    attempts: attempt,
                },
            );
        }

        match response.text().await {
            Ok(body) => Attempt::Done(FetchOutcome {
                status: status.as_u16(),
                body,
            }),
            Err(e) => self.transport_failure(url, attempt, e),
        }
    }

    fn transport_failure(&self, url: &str, attempt: u32, source: reqwest::Error) -> Attempt {
        match classify_error(&source) {
            Some(reason) => Attempt::Retry(
                reason,
                FetchError::TransportExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source,
                },
            ),
            None => Attempt::Fail(FetchError::Transport {
                url: url.to_string(),
                source,
            }),
        }
    }
}
