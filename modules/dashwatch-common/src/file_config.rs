use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// TOML-backed tuning loaded from disk. Every section is optional and falls
/// back to the defaults below. Secrets stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub paths: PathsConfig,
    pub comments: DispatchConfig,
    pub complaints: DispatchConfig,
    pub daily: DispatchConfig,
    pub guard: GuardConfig,
    pub webhook: WebhookConfig,
    pub vision: VisionConfig,
    pub session: SessionConfig,
    /// Metric key → status rules.
    pub thresholds: BTreeMap<String, ThresholdConfig>,
}

impl FileConfig {
    /// Defaults with per-pipeline dispatch tuning applied.
    pub fn defaults() -> Self {
        Self {
            comments: DispatchConfig {
                per_run_cap: 30,
                ..DispatchConfig::default()
            },
            complaints: DispatchConfig {
                per_run_cap: 20,
                ..DispatchConfig::default()
            },
            daily: DispatchConfig {
                batch_size: 1,
                per_run_cap: 1,
                ..DispatchConfig::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub lock_file: PathBuf,
    pub comments_log: PathBuf,
    pub complaints_log: PathBuf,
    pub daily_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from("state/comments.lock"),
            comments_log: PathBuf::from("state/sent_comments.jsonl"),
            complaints_log: PathBuf::from("state/sent_complaints.jsonl"),
            daily_log: PathBuf::from("state/daily_reports.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub per_run_cap: usize,
    pub max_attempts: u32,
    pub base_backoff_secs: f64,
    pub backoff_factor: f64,
    pub max_backoff_secs: f64,
    pub batch_pause_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            per_run_cap: 30,
            max_attempts: 5,
            base_backoff_secs: 2.0,
            backoff_factor: 1.7,
            max_backoff_secs: 30.0,
            batch_pause_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub stale_after_minutes: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout_secs: 20 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout_secs: u64,
    /// Metrics always re-read from the screenshot, even when the text parsed.
    pub vision_only: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "claude-sonnet-4-20250514".to_string(),
            timeout_secs: 90,
            vision_only: [
                "supermarket_nps",
                "colleague_happiness",
                "home_delivery_nps",
                "cafe_nps",
                "click_collect_nps",
                "customer_toilet_nps",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell command that refreshes the dashboard sign-in, run once per invalid capture.
    pub reauth_command: Option<String>,
}

/// Status rules for one metric. Each rule is a condition string such as
/// `">= 95"`, `"< 90"` or `"between 90 95"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub target: Option<String>,
    pub green: Option<String>,
    pub red: Option<String>,
    pub amber: Option<String>,
    pub below_range: Option<String>,
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load the config at `path`, or the defaults when the file does not exist.
pub fn load_config_or_default(path: &Path) -> Result<FileConfig> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        Ok(FileConfig::defaults())
    }
}

fn parse_config(content: &str) -> Result<FileConfig> {
    let mut table: toml::Table = toml::from_str(content)?;
    let defaults = FileConfig::defaults();

    // Dispatch tables are merged key by key over their pipeline's own defaults.
    for (name, base) in [
        ("comments", &defaults.comments),
        ("complaints", &defaults.complaints),
        ("daily", &defaults.daily),
    ] {
        let toml::Value::Table(mut merged) = toml::Value::try_from(base)? else {
            continue;
        };
        match table.remove(name) {
            Some(toml::Value::Table(user)) => merged.extend(user),
            Some(other) => {
                table.insert(name.to_string(), other);
                continue;
            }
            None => {}
        }
        table.insert(name.to_string(), toml::Value::Table(merged));
    }

    Ok(toml::Value::Table(table).try_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_pipeline_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.comments.per_run_cap, 30);
        assert_eq!(config.complaints.per_run_cap, 20);
        assert_eq!(config.daily.batch_size, 1);
        assert_eq!(config.guard.stale_after_minutes, 20);
        assert_eq!(config.vision.vision_only.len(), 6);
        assert!(config.thresholds.is_empty());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = parse_config(
            r#"
[comments]
batch_size = 5

[thresholds.availability_pct]
target = "95%"
green = ">= 95"
red = "< 90"
"#,
        )
        .unwrap();
        assert_eq!(config.comments.batch_size, 5);
        assert_eq!(config.comments.max_attempts, 5);
        assert_eq!(config.complaints.per_run_cap, 20);

        let rule = &config.thresholds["availability_pct"];
        assert_eq!(rule.green.as_deref(), Some(">= 95"));
        assert!(rule.amber.is_none());
    }

    #[test]
    fn partial_pipeline_tables_keep_their_own_caps() {
        let config = parse_config("[complaints]\nbatch_size = 5\n\n[daily]\nmax_attempts = 2\n").unwrap();
        assert_eq!(config.complaints.batch_size, 5);
        assert_eq!(config.complaints.per_run_cap, 20);
        assert_eq!(config.daily.max_attempts, 2);
        assert_eq!(config.daily.batch_size, 1);
        assert_eq!(config.daily.per_run_cap, 1);
        assert_eq!(config.comments.per_run_cap, 30);
    }

    #[test]
    fn non_table_pipeline_section_is_rejected() {
        assert!(parse_config("complaints = 3").is_err());
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(parse_config("[nope]\nx = 1").is_err());
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[guard]\nstale_after_minutes = 5").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.guard.stale_after_minutes, 5);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.comments.batch_size, 10);
    }
}
