use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use tracing::debug;

use super::types::{ChatRequest, ChatResponse};
use crate::error::{AiError, Result};
use crate::util::{clip, ERROR_BODY_LIMIT};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// The `/messages` endpoint, bound to one key and base URL.
pub(crate) struct MessagesEndpoint {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl MessagesEndpoint {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(model = %request.model, url = %self.url, "Messages request");

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(rejection(response).await)
    }
}

async fn rejection(response: Response) -> AiError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return AiError::RateLimited { retry_after_secs };
    }

    let body = response.text().await.unwrap_or_default();
    AiError::Api {
        status: status.as_u16(),
        message: clip(&body, ERROR_BODY_LIMIT).to_string(),
    }
}
