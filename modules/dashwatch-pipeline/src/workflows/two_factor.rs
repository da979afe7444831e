use tracing::{info, warn};

use dashwatch_common::DashwatchError;

use super::{RunDeps, RunStats};
use crate::two_factor::{alert_lines, detect_challenge, extract_code};

/// Look for a number-matching sign-in prompt and send the number to the
/// alert webhook. Reads the page once; there is no login-wall retry here
/// because the prompt itself is a login wall.
pub async fn run(deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let capture = deps.source.capture().await?;
    let text = capture.text();

    let mut stats = RunStats::default();
    if !detect_challenge(&text) {
        info!("No 2FA challenge on the page");
        return Ok(stats);
    }

    let code = extract_code(&text);
    match &code {
        Some(code) => info!(code = %code.code, options = code.options.len(), "2FA code found"),
        None => warn!("2FA challenge detected but no code found"),
    }
    deps.alerts.send_lines(&alert_lines(code.as_ref())).await;
    stats.alerts_sent = 1;
    Ok(stats)
}
