use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use chat_webhook::ChatWebhook;
use dashwatch_common::{AppConfig, DashwatchError, FileConfig};
use dashwatch_pipeline::correction::{ClaudeVision, VisionCorrector};
use dashwatch_pipeline::{workflows, AlertSink, ChatBackend, FileSource, Pipeline, RunDeps};

#[derive(Parser)]
#[command(name = "dashwatch", about = "Dashboard text to chat alerts, without repeats")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/dashwatch.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send new NPS comments
    Comments(CaptureArgs),
    /// Send new customer complaints
    Complaints(CaptureArgs),
    /// Send the daily metrics summary
    Daily(CaptureArgs),
    /// Relay a number-matching sign-in code to the alert webhook
    TwoFactor(CaptureArgs),
}

#[derive(Args)]
struct CaptureArgs {
    /// Visible page text dumped by the browser job
    #[arg(long)]
    text: PathBuf,

    /// Full-page PNG screenshot
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// The browser job saw a sign-in wall
    #[arg(long)]
    session_invalid: bool,
}

impl Command {
    fn split(self) -> (Pipeline, CaptureArgs) {
        match self {
            Command::Comments(a) => (Pipeline::Comments, a),
            Command::Complaints(a) => (Pipeline::Complaints, a),
            Command::Daily(a) => (Pipeline::Daily, a),
            Command::TwoFactor(a) => (Pipeline::TwoFactor, a),
        }
    }
}

/// Every workspace crate logs at info unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_FILTER: &str =
    "dashwatch=info,dashwatch_pipeline=info,dashwatch_common=info,chat_webhook=info,ai_client=info";

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn webhook(url: &str, timeout: Duration) -> Result<ChatWebhook> {
    ChatWebhook::with_timeout(url, timeout)
        .with_context(|| format!("Invalid webhook {}", chat_webhook::redact(url)))
}

fn content_webhook(pipeline: Pipeline, app: &AppConfig) -> Option<&str> {
    match pipeline {
        Pipeline::Comments => app.main_webhook.as_deref(),
        Pipeline::Complaints => app.complaints_webhook.as_deref(),
        Pipeline::Daily => app.daily_webhook.as_deref(),
        Pipeline::TwoFactor => app.alert_webhook.as_deref(),
    }
}

fn vision_client(file: &FileConfig, app: &AppConfig) -> Option<ClaudeVision> {
    if !file.vision.enabled {
        return None;
    }
    let Some(key) = &app.anthropic_api_key else {
        info!("No ANTHROPIC_API_KEY set, vision correction disabled");
        return None;
    };
    let claude = Claude::new(key.clone(), file.vision.model.clone())
        .with_timeout(Duration::from_secs(file.vision.timeout_secs));
    Some(ClaudeVision::new(claude))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let app = AppConfig::from_env()?;
    let file = dashwatch_common::load_config_or_default(&cli.config)?;
    let timeout = Duration::from_secs(file.webhook.timeout_secs);
    let (pipeline, args) = cli.command.split();

    info!(pipeline = %pipeline, config = %cli.config.display(), "dashwatch starting");

    let alert_backend: Option<Box<dyn ChatBackend>> = match &app.alert_webhook {
        Some(url) => Some(Box::new(webhook(url, timeout)?)),
        None => None,
    };
    let alerts = AlertSink::new(alert_backend, app.ci_run_url.clone());

    let Some(url) = content_webhook(pipeline, &app) else {
        let err = DashwatchError::Config(format!("no webhook configured for {pipeline}"));
        alerts.fatal(pipeline.name(), &err).await;
        return Err(err.into());
    };
    let chat = webhook(url, timeout)?;

    let mut source = FileSource::new(args.text)
        .with_reauth_command(file.session.reauth_command.clone())
        .with_session_invalid(args.session_invalid);
    if let Some(path) = args.screenshot {
        source = source.with_screenshot(path);
    }

    let vision = vision_client(&file, &app);
    let deps = RunDeps {
        config: &file,
        chat: &chat,
        alerts: &alerts,
        source: &source,
        vision: vision.as_ref().map(|v| v as &dyn VisionCorrector),
        run_date: chrono::Utc::now().date_naive(),
    };

    workflows::run(pipeline, &deps).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_every_workspace_crate() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for target in ["dashwatch_pipeline", "dashwatch_common", "chat_webhook", "ai_client"] {
            assert!(
                DEFAULT_LOG_FILTER.contains(&format!("{target}=info")),
                "{target} missing from default filter"
            );
        }
    }

    #[test]
    fn capture_args_parse() {
        let cli = Cli::try_parse_from(["dashwatch", "daily", "--text", "page.txt", "--session-invalid"]).unwrap();
        assert!(!cli.json_logs);
        let (pipeline, _) = cli.command.split();
        assert_eq!(pipeline, Pipeline::Daily);
    }
}
