//! Gateway error taxonomy.
//!
//! Errors are classified at the point they are observed so retry and
//! failover decisions never have to re-parse message strings:
//!
//! - [`GatewayError::ModelNotFound`] and [`GatewayError::Authentication`]
//!   are fail-fast — retrying cannot change the outcome.
//! - [`GatewayError::Network`] and [`GatewayError::Http`] are transient and
//!   eligible for retry with backoff.
//! - [`GatewayError::Cancelled`] is silent: no user-visible error, no stats.
//! - [`GatewayError::Protocol`] marks a malformed stream line; the stream
//!   loop skips the line rather than aborting.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors produced by the inference gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The endpoint does not serve the requested model (HTTP 404).
    #[error("model not found at {0}")]
    ModelNotFound(String),

    /// Credentials were rejected (HTTP 401).
    #[error("authentication rejected by {0}")]
    Authentication(String),

    /// Connection-level failure: refused, reset, timed out.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status other than 404/401.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The generation was cancelled by the caller.
    #[error("generation cancelled")]
    Cancelled,

    /// A stream line or response body did not match the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Classify an HTTP status into the gateway taxonomy.
    ///
    /// `origin` identifies the endpoint for the fail-fast variants; `body`
    /// carries whatever error text the server returned.
    pub fn from_status(status: u16, origin: &str, body: String) -> Self {
        match status {
            404 => GatewayError::ModelNotFound(origin.to_string()),
            401 => GatewayError::Authentication(origin.to_string()),
            _ => GatewayError::Http { status, body },
        }
    }

    /// Whether a retry with backoff could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::Http { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_is_model_not_found() {
        let err = GatewayError::from_status(404, "http://host:11434", String::new());
        assert!(matches!(err, GatewayError::ModelNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_401_is_authentication() {
        let err = GatewayError::from_status(401, "http://host:11434", String::new());
        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn other_statuses_are_retryable() {
        for status in [429, 500, 502, 503, 504] {
            let err = GatewayError::from_status(status, "http://host", "busy".into());
            assert!(err.is_retryable(), "HTTP {status} should be retryable");
        }
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert!(!GatewayError::Cancelled.is_retryable());
    }
}
