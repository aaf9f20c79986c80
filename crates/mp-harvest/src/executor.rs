//! Authenticated GET with classification and bounded retry
//!
//! | Condition                   | Result                 | Retried |
//! |-----------------------------|------------------------|---------|
//! | 200 + JSON body             | `Ok(Value)`            | -       |
//! | 200 + anything else         | `Malformed`            | no      |
//! | 401                         | `AuthExpired`          | no      |
//! | other 4xx                   | `Client`               | no      |
//! | 5xx                         | `Server`               | yes     |
//! | any other status            | `Http`                 | no      |
//! | timeout / connection fault  | `Network`              | yes     |
//!
//! Attempt `n` (zero-based) that fails transiently is followed by a sleep of
//! `backoff_base * 2^n`. Total attempts never exceed `max_retries + 1`.

use std::time::Duration;

use reqwest::Url;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::metrics;

/// Maximum response body characters kept in error messages
const ERROR_BODY_LIMIT: usize = 300;

/// Per-request retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_millis(timeout_ms: u64, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(30_000, 3, 1_000)
    }
}

/// Issues bearer-authenticated GETs against the procurement API.
#[derive(Debug, Clone)]
pub struct Executor {
    client: reqwest::Client,
}

impl Executor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the parsed JSON body.
    ///
    /// Fatal failures return on the attempt they happen. A retryable failure
    /// on the last allowed attempt is returned as-is.
    #[instrument(skip_all, fields(url = %url.path()))]
    pub async fn execute(
        &self,
        url: &Url,
        token: &str,
        policy: &RetryPolicy,
    ) -> Result<serde_json::Value, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(url, token, policy.timeout).await {
                Ok(body) => {
                    metrics::record_request("success");
                    if attempt > 0 {
                        debug!(attempt, "request succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(e) => {
                    metrics::record_request(e.label());
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= policy.max_retries {
                        warn!(attempts = attempt + 1, error = %e, "retries exhausted");
                        return Err(e);
                    }
                    let delay = policy.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, backing off"
                    );
                    metrics::record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        token: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Network(describe(&e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("reading response body: {}", describe(&e))))?;

        classify(status, &body)
    }
}

/// Map a status and body to the executor's outcome.
pub fn classify(status: u16, body: &str) -> Result<serde_json::Value, FetchError> {
    match status {
        200 => serde_json::from_str(body)
            .map_err(|e| FetchError::Malformed(format!("response body is not JSON: {e}"))),
        401 => Err(FetchError::AuthExpired(format!(
            "server answered 401: {}",
            truncate(body, ERROR_BODY_LIMIT)
        ))),
        400..=499 => Err(FetchError::Client {
            status,
            body: truncate(body, ERROR_BODY_LIMIT).to_string(),
        }),
        500..=599 => Err(FetchError::Server {
            status,
            body: truncate(body, ERROR_BODY_LIMIT).to_string(),
        }),
        _ => Err(FetchError::Http {
            status,
            body: truncate(body, ERROR_BODY_LIMIT).to_string(),
        }),
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
