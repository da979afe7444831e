use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, warn};

use chat_webhook::{ChatWebhook, WebhookError};
use dashwatch_common::DashwatchError;

/// Somewhere a chat payload can be posted. One call is one HTTP attempt.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn post(&self, payload: &Value) -> Result<(), WebhookError>;
}

#[async_trait]
impl ChatBackend for ChatWebhook {
    async fn post(&self, payload: &Value) -> Result<(), WebhookError> {
        ChatWebhook::post(self, payload).await
    }
}

/// High-priority path for fatal conditions and sign-in prompts, kept apart
/// from the content webhooks.
pub struct AlertSink {
    backend: Option<Box<dyn ChatBackend>>,
    ci_run_url: Option<String>,
}

impl AlertSink {
    pub fn new(backend: Option<Box<dyn ChatBackend>>, ci_run_url: Option<String>) -> Self {
        Self {
            backend,
            ci_run_url,
        }
    }

    /// An alert sink that only logs.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Post plain text lines, with the CI run link appended when known.
    /// Delivery failures are logged, not returned.
    pub async fn send_lines(&self, lines: &[String]) {
        let mut text = lines.join("\n");
        if let Some(url) = &self.ci_run_url {
            text.push_str(&format!("\nRun: {url}"));
        }
        self.send_payload(&json!({ "text": text })).await;
    }

    pub async fn send_payload(&self, payload: &Value) {
        let Some(backend) = &self.backend else {
            warn!("No ALERT_WEBHOOK configured, alert not delivered");
            return;
        };
        if let Err(e) = backend.post(payload).await {
            warn!(error = %e, "Failed to deliver alert");
        }
    }

    /// Report a run-ending error.
    pub async fn fatal(&self, pipeline: &str, err: &DashwatchError) {
        error!(pipeline, kind = err.kind(), error = %err, "Run failed");
        let emoji = match err {
            DashwatchError::LockHeld { .. } => "⏳",
            DashwatchError::SessionInvalid(_) => "🔐",
            _ => "🚨",
        };
        self.send_lines(&[
            format!("{emoji} {pipeline}: {}", err.kind()),
            err.to_string(),
        ])
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChat;

    #[tokio::test]
    async fn fatal_alert_carries_kind_and_run_url() {
        let chat = RecordingChat::new();
        let sink = AlertSink::new(
            Some(Box::new(chat.clone())),
            Some("https://ci.example/runs/7".into()),
        );

        sink.fatal("comments", &DashwatchError::SessionInvalid("still signed out".into()))
            .await;

        let sent = chat.payloads();
        assert_eq!(sent.len(), 1);
        let text = sent[0]["text"].as_str().unwrap();
        assert!(text.contains("comments: session invalid"));
        assert!(text.contains("still signed out"));
        assert!(text.ends_with("Run: https://ci.example/runs/7"));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let chat = RecordingChat::new().then_fail(WebhookError::Timeout);
        let sink = AlertSink::new(Some(Box::new(chat.clone())), None);
        sink.send_lines(&["hello".into()]).await;
        assert_eq!(chat.attempts(), 1);
    }
}
