use anyhow::Result;
use tracing::warn;

/// Secrets and environment-specific endpoints, loaded from the environment
/// (with `.env` support). Tuning lives in the TOML [`FileConfig`](crate::FileConfig).
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    // Chat webhooks
    pub main_webhook: Option<String>,
    pub alert_webhook: Option<String>,
    pub complaints_webhook: Option<String>,
    pub daily_webhook: Option<String>,

    // Vision
    pub anthropic_api_key: Option<String>,

    // CI
    pub ci_run_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.log_redacted();
        Ok(config)
    }

    /// Build from any key lookup. Webhooks that are not Google Chat URLs are
    /// dropped with a warning; the complaints and daily hooks fall back to main.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let webhook = |key: &str| {
            let raw = non_empty(key)?;
            match chat_webhook::validate_url(&raw) {
                Ok(_) => Some(raw),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring invalid webhook URL");
                    None
                }
            }
        };

        let main_webhook = webhook("MAIN_WEBHOOK");
        Self {
            alert_webhook: webhook("ALERT_WEBHOOK"),
            complaints_webhook: webhook("COMPLAINTS_WEBHOOK").or_else(|| main_webhook.clone()),
            daily_webhook: webhook("DAILY_WEBHOOK").or_else(|| main_webhook.clone()),
            main_webhook,
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            ci_run_url: non_empty("CI_RUN_URL"),
        }
    }

    pub fn log_redacted(&self) {
        fn hook(val: &Option<String>) -> String {
            match val {
                Some(v) => chat_webhook::redact(v),
                None => "<not set>".to_string(),
            }
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let head: String = v.chars().take(5).collect();
                    format!("{head}...({} chars)", v.len())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  MAIN_WEBHOOK: {}", hook(&self.main_webhook));
        tracing::info!("  ALERT_WEBHOOK: {}", hook(&self.alert_webhook));
        tracing::info!("  COMPLAINTS_WEBHOOK: {}", hook(&self.complaints_webhook));
        tracing::info!("  DAILY_WEBHOOK: {}", hook(&self.daily_webhook));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview_opt(&self.anthropic_api_key));
        tracing::info!(
            "  CI_RUN_URL: {}",
            self.ci_run_url.as_deref().unwrap_or("<not set>")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MAIN: &str = "https://chat.googleapis.com/v1/spaces/MAIN/messages?token=aaaaaa";
    const ALERT: &str = "https://chat.googleapis.com/v1/spaces/ALERT/messages?token=bbbbbb";

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn pipeline_hooks_fall_back_to_main() {
        let cfg = config(&[("MAIN_WEBHOOK", MAIN), ("ALERT_WEBHOOK", ALERT)]);
        assert_eq!(cfg.complaints_webhook.as_deref(), Some(MAIN));
        assert_eq!(cfg.daily_webhook.as_deref(), Some(MAIN));
        assert_eq!(cfg.alert_webhook.as_deref(), Some(ALERT));
    }

    #[test]
    fn foreign_webhooks_are_dropped() {
        let cfg = config(&[
            ("MAIN_WEBHOOK", "https://example.com/hook"),
            ("ALERT_WEBHOOK", "   "),
        ]);
        assert!(cfg.main_webhook.is_none());
        assert!(cfg.alert_webhook.is_none());
        assert!(cfg.complaints_webhook.is_none());
    }

    #[test]
    fn optional_keys_are_trimmed() {
        let cfg = config(&[("CI_RUN_URL", " https://ci.example/run/1 ")]);
        assert_eq!(cfg.ci_run_url.as_deref(), Some("https://ci.example/run/1"));
        assert!(cfg.anthropic_api_key.is_none());
    }
}
