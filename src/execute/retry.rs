use crate::Result;
use reqwest::header::HeaderMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Statuses worth resending: timeouts, server faults, and throttling.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Exponential backoff that defers to a server-supplied `Retry-After`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry attempt count, capped at 5.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.min(5);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Best-effort `Retry-After` parsing; only the seconds form is
    /// supported.
    pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get("Retry-After")?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// Delay before the given 0-based attempt: the server hint when one
    /// was supplied, else `base * 2^attempt`, capped.
    pub fn wait_time(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.max_delay);
        }
        let exp = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        exp.min(self.max_delay)
    }

    /// Run `send` under this policy: retryable statuses and transient
    /// transport errors are resent after the computed wait, everything
    /// else returns immediately.
    pub async fn run<F, Fut>(&self, mut send: F) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response>>,
    {
        let mut attempt = 0u32;
        loop {
            match send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !Self::is_retryable_status(status) || attempt >= self.max_retries {
                        return Ok(response);
                    }
                    let wait = self.wait_time(attempt, Self::retry_after(response.headers()));
                    debug!(status, attempt, wait_ms = wait.as_millis() as u64, "retrying send");
                    tokio::time::sleep(wait).await;
                }
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.max_retries {
                        return Err(error);
                    }
                    let wait = self.wait_time(attempt, error.retry_after());
                    debug!(%error, attempt, wait_ms = wait.as_millis() as u64, "retrying send");
                    tokio::time::sleep(wait).await;
                }
            }
            attempt += 1;
        }
    }
}
