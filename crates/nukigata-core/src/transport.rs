//! HTTP transport with bounded, jittered retry.
//!
//! Only 429 and 5xx are retried. Any other status is handed back on the first
//! attempt, and an exhausted budget hands back the last response unchanged so
//! callers classify status codes themselves.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{truncate_body, NukigataError, NukigataResult};

pub const USER_AGENT_VALUE: &str = concat!("nukigata/", env!("CARGO_PKG_VERSION"));

/// Backoff parameters.
///
/// The delay after failed attempt `n` (1-based) is
/// `min(cap, base * 2^(n-1) + jitter)` with `jitter` uniform in `[0, jitter_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_ms() -> u64 {
    300
}

fn default_cap_ms() -> u64 {
    4000
}

fn default_jitter_ms() -> u64 {
    120
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_ms: default_base_ms(),
            cap_ms: default_cap_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Scale every delay parameter (tests use millisecond-sized policies).
    pub fn with_delays(mut self, base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Self {
        self.base_ms = base_ms;
        self.cap_ms = cap_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    /// Delay after failed attempt `attempt` with an explicit jitter.
    pub fn backoff(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let exp = self.base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(exp.saturating_add(jitter_ms).min(self.cap_ms))
    }

    /// Delay after failed attempt `attempt` with random jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        };
        self.backoff(attempt, jitter)
    }
}

/// Append path segments to a base URL, percent-encoding each segment.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> NukigataResult<Url> {
    let mut url = Url::parse(base_url).map_err(|e| NukigataError::Config {
        message: format!("invalid base url {}: {}", base_url, e),
    })?;

    url.path_segments_mut()
        .map_err(|_| NukigataError::config(format!("base url cannot have a path: {}", base_url)))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Pass a 2xx response through; map anything else to [`NukigataError::Upstream`].
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> NukigataResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NukigataError::Upstream {
        service,
        status: status.as_u16(),
        message: truncate_body(&body),
    })
}

/// Whether a status is worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Shared HTTP client plus retry policy.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Build a client with the crate user agent and a per-request timeout.
    pub fn with_timeout(timeout: Duration, policy: RetryPolicy) -> NukigataResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| NukigataError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self::new(client, policy))
    }

    /// Underlying client, for calls that must not be retried.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request`, retrying 429/5xx within the attempt budget.
    ///
    /// Connection-level failures are returned as [`NukigataError::Network`]
    /// without retry. Requests with a streaming body cannot be cloned and are
    /// sent exactly once.
    pub async fn send(&self, request: reqwest::Request) -> NukigataResult<reqwest::Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let method = request.method().clone();
        let url = request.url().clone();
        let mut attempt = 1;

        loop {
            let current = match request.try_clone() {
                Some(current) => current,
                None => {
                    debug!(%method, %url, "request body not cloneable, sending once");
                    return Ok(self.client.execute(request).await?);
                }
            };

            let response = self.client.execute(current).await?;
            let status = response.status();

            if !is_retryable_status(status) {
                debug!(%method, %url, status = status.as_u16(), attempt, "request complete");
                return Ok(response);
            }

            if attempt >= max_attempts {
                warn!(
                    %method,
                    %url,
                    status = status.as_u16(),
                    attempts = attempt,
                    "retry budget exhausted"
                );
                return Ok(response);
            }

            let backoff = self.policy.next_delay(attempt);
            warn!(
                %method,
                %url,
                status = status.as_u16(),
                retry = attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "retrying request"
            );

            drop(response);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
