//! Retrying HTTP transport for short, non-streaming calls.
//!
//! Wraps a request in bounded exponential backoff: HTTP 404 surfaces as
//! [`GatewayError::ModelNotFound`] and 401 as
//! [`GatewayError::Authentication`], both fail-fast; any other non-success
//! status or connection failure is retried up to `max_retries` times with
//! the delay doubling each attempt, then the final error is surfaced.
//!
//! The long-lived streaming chat call does NOT go through this wrapper — it
//! has its own one-shot remote-to-local failover in the orchestrator, and
//! replaying a half-consumed stream is not meaningful.

use std::time::Duration;

use tracing::debug;

use crate::error::{GatewayError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 = doubling).
    pub multiplier: f64,
    /// Whether to dampen delays to avoid thundering herds.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries, defaults elsewhere.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number; good enough
            // to de-synchronize clients without pulling randomness into the
            // retry path.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Send `request`, retrying transient failures per `retry`.
///
/// The builder is cloned for each attempt, so streaming bodies (which are
/// not cloneable) are rejected up front.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    retry: &RetryConfig,
) -> Result<reqwest::Response> {
    let mut attempt: u32 = 0;
    loop {
        let Some(cloned) = request.try_clone() else {
            return Err(GatewayError::Network(
                "request body is not replayable".to_string(),
            ));
        };

        let error = match cloned.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let origin = resp.url().to_string();
                let body = resp.text().await.unwrap_or_default();
                GatewayError::from_status(status, &origin, body)
            }
            Err(err) => GatewayError::Network(err.to_string()),
        };

        if !error.is_retryable() || attempt >= retry.max_retries {
            return Err(error);
        }

        let delay = retry.delay_for_attempt(attempt);
        debug!(
            "retrying request after {error} ({} of {} retries, {delay:?} backoff)",
            attempt + 1,
            retry.max_retries,
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
