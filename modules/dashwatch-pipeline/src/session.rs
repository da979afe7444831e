use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use dashwatch_common::DashwatchError;

use crate::capture::{Capture, Screenshot, SessionState};

const REAUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Where page captures come from. Browsing and sign-in happen outside this crate.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn capture(&self) -> Result<Capture, DashwatchError>;

    /// Refresh the dashboard sign-in so the next capture is authenticated.
    async fn reauthenticate(&self) -> Result<(), DashwatchError>;
}

/// Capture the page, re-authenticating once if the session is invalid.
/// A second invalid capture is fatal.
pub async fn fetch_with_reauth(source: &dyn PageSource) -> Result<Capture, DashwatchError> {
    let capture = source.capture().await?;
    if !capture.session_invalid() {
        return Ok(capture);
    }

    warn!("Dashboard session invalid, re-authenticating");
    source.reauthenticate().await?;

    let retry = source.capture().await?;
    if retry.session_invalid() {
        return Err(DashwatchError::SessionInvalid(
            "still signed out after re-authentication".to_string(),
        ));
    }
    info!(lines = retry.lines.len(), "Session restored");
    Ok(retry)
}

/// Reads the text (and optional screenshot) dumped by the browser job.
#[derive(Debug)]
pub struct FileSource {
    text_path: PathBuf,
    screenshot_path: Option<PathBuf>,
    reauth_command: Option<String>,
    /// Set when the browser job reported a dead session; applies to the first capture only.
    flagged_invalid: AtomicBool,
}

impl FileSource {
    pub fn new(text_path: impl Into<PathBuf>) -> Self {
        Self {
            text_path: text_path.into(),
            screenshot_path: None,
            reauth_command: None,
            flagged_invalid: AtomicBool::new(false),
        }
    }

    pub fn with_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = Some(path.into());
        self
    }

    pub fn with_reauth_command(mut self, command: Option<String>) -> Self {
        self.reauth_command = command.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_session_invalid(self, invalid: bool) -> Self {
        self.flagged_invalid.store(invalid, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl PageSource for FileSource {
    async fn capture(&self) -> Result<Capture, DashwatchError> {
        let text = tokio::fs::read_to_string(&self.text_path)
            .await
            .map_err(|e| {
                DashwatchError::Capture(format!("{}: {e}", self.text_path.display()))
            })?;
        let mut capture = Capture::from_text(&text);

        if let Some(path) = &self.screenshot_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => capture = capture.with_screenshot(Screenshot::png(bytes)),
                Err(e) => warn!(path = %path.display(), error = %e, "Screenshot unreadable, continuing without it"),
            }
        }

        if self.flagged_invalid.swap(false, Ordering::SeqCst) {
            capture = capture.with_session(SessionState::Invalid);
        }

        info!(
            path = %self.text_path.display(),
            lines = capture.lines.len(),
            screenshot = capture.screenshot.is_some(),
            "Captured page text"
        );
        Ok(capture)
    }

    async fn reauthenticate(&self) -> Result<(), DashwatchError> {
        let Some(command) = &self.reauth_command else {
            warn!("No reauth command configured, retrying capture as-is");
            return Ok(());
        };

        info!(command = %command, "Running reauth command");
        let result = tokio::time::timeout(
            REAUTH_TIMEOUT,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(DashwatchError::SessionInvalid(format!(
                "reauth command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Ok(Err(e)) => Err(DashwatchError::SessionInvalid(format!(
                "reauth command failed to start: {e}"
            ))),
            Err(_) => Err(DashwatchError::SessionInvalid(format!(
                "reauth command timed out after {}s",
                REAUTH_TIMEOUT.as_secs()
            ))),
        }
    }
}
