use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebhookError>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Webhook request timed out")]
    Timeout,

    #[error("Rate limited by webhook (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl WebhookError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Network(_) | WebhookError::Timeout | WebhookError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for WebhookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebhookError::Timeout
        } else {
            WebhookError::Network(err.to_string())
        }
    }
}
