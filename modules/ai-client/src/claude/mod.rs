mod client;
pub(crate) mod types;

use std::time::Duration;

use base64::Engine;
use tracing::debug;

use crate::error::{AiError, Result};
use client::{MessagesEndpoint, DEFAULT_BASE_URL};
use types::{ChatRequest, ImageSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// An image handed to the model as-is.
#[derive(Debug, Clone)]
pub struct ImageInput<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

impl<'a> ImageInput<'a> {
    pub fn png(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            mime_type: "image/png",
        }
    }
}

/// Vision reads against the Claude Messages API.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> Result<MessagesEndpoint> {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        MessagesEndpoint::new(&self.api_key, base_url, self.timeout)
    }

    /// Send an image to Claude vision and return the text of the reply.
    pub async fn describe_image(
        &self,
        image: ImageInput<'_>,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(image.bytes);
        let mut request =
            ChatRequest::vision(&self.model, ImageSource::base64(image.mime_type, data), prompt);
        request.system = system.map(str::to_string);

        debug!(
            model = %self.model,
            image_bytes = image.bytes.len(),
            "Claude vision request"
        );

        let response = self.endpoint()?.send(&request).await?;

        response.into_text().ok_or(AiError::EmptyResponse)
    }
}
