pub mod error;

pub use error::{Result, WebhookError};

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

const ALLOWED_HOST: &str = "chat.googleapis.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Check that `raw` is an https URL on the Google Chat webhook host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "https" {
        return Err(WebhookError::InvalidUrl(format!(
            "expected https, got {}",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if host == ALLOWED_HOST => Ok(url),
        Some(host) => Err(WebhookError::InvalidUrl(format!(
            "host {host} is not {ALLOWED_HOST}"
        ))),
        None => Err(WebhookError::InvalidUrl("missing host".to_string())),
    }
}

/// Render a webhook URL safe for logs: host plus the last six characters.
pub fn redact(raw: &str) -> String {
    let host = Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| "?".to_string());
    let tail: String = {
        let chars: Vec<char> = raw.chars().collect();
        chars[chars.len().saturating_sub(6)..].iter().collect()
    };
    format!("{host}/…{tail}")
}

pub struct ChatWebhook {
    client: reqwest::Client,
    url: Url,
}

impl ChatWebhook {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let url = validate_url(url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    /// Build a client without host validation. Used to point at a local test server.
    pub fn unchecked(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn redacted(&self) -> String {
        redact(self.url.as_str())
    }

    /// Post a JSON payload. Exactly one HTTP attempt; retry policy belongs to the caller.
    pub async fn post(&self, payload: &Value) -> Result<()> {
        debug!(webhook = %self.redacted(), "Posting to chat webhook");

        let resp = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json; charset=UTF-8")
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            warn!(webhook = %self.redacted(), ?retry_after, "Chat webhook rate limited");
            return Err(WebhookError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message: String = body.chars().take(300).collect();
            warn!(status = %status, body = %message, "Chat webhook returned non-success");
            return Err(WebhookError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}
