//! Metric correction: fill gaps in the text-parsed metrics from a vision read
//! of the screenshot, then grade each metric against its configured rules.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use ai_client::{Claude, ImageInput};
use dashwatch_common::file_config::ThresholdConfig;
use dashwatch_common::{is_placeholder, MetricRecord, MetricStatus};

use crate::capture::Screenshot;
use crate::parse::metrics::metric_def;

// =============================================================================
// Vision collaborator
// =============================================================================

/// Reads requested metric values off a dashboard screenshot.
#[async_trait]
pub trait VisionCorrector: Send + Sync {
    /// Returns metric key → displayed value. Keys outside `requested` are ignored by callers.
    async fn correct(
        &self,
        screenshot: &Screenshot,
        requested: &[String],
    ) -> Result<HashMap<String, String>>;
}

const VISION_SYSTEM: &str = "You read retail dashboard screenshots. \
Reply with one JSON object and nothing else.";

/// [`VisionCorrector`] backed by Claude vision.
pub struct ClaudeVision {
    claude: Claude,
}

impl ClaudeVision {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }

    fn prompt(requested: &[String]) -> String {
        let mut prompt = String::from(
            "Read these metrics from the dashboard screenshot. Map each key to the value \
             exactly as displayed, keeping any %, £ or K/M suffix. Leave out keys you cannot read.\n",
        );
        for key in requested {
            let label = metric_def(key).map(|d| d.label).unwrap_or(key.as_str());
            prompt.push_str(&format!("- {key}: {label}\n"));
        }
        prompt
    }
}

#[async_trait]
impl VisionCorrector for ClaudeVision {
    async fn correct(
        &self,
        screenshot: &Screenshot,
        requested: &[String],
    ) -> Result<HashMap<String, String>> {
        let image = ImageInput {
            bytes: &screenshot.bytes,
            mime_type: &screenshot.mime_type,
        };
        let reply = self
            .claude
            .describe_image(image, Some(VISION_SYSTEM), &Self::prompt(requested))
            .await
            .context("Vision request failed")?;
        let object = ai_client::parse_json_object(&reply).context("Vision reply was not JSON")?;

        Ok(object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s.trim().to_string())),
                Value::Number(n) => Some((key, n.to_string())),
                _ => None,
            })
            .collect())
    }
}

// =============================================================================
// Correction
// =============================================================================

/// True when the parser found nothing at all. The dashboard's own "No data"
/// is a real reading and is not sent for correction.
fn unextracted(metric: &MetricRecord) -> bool {
    match metric.raw_value.as_deref().map(str::trim) {
        None | Some("") | Some("-") | Some("—") => true,
        Some(_) => false,
    }
}

/// Metrics that need a vision read: every unextracted metric plus the vision-only set.
pub fn needs_correction(metrics: &[MetricRecord], vision_only: &[String]) -> Vec<String> {
    metrics
        .iter()
        .filter(|m| unextracted(m) || vision_only.iter().any(|v| v == &m.name))
        .map(|m| m.name.clone())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionOutcome {
    pub requested: usize,
    pub corrected: usize,
    /// The collaborator failed; metrics kept their parsed values.
    pub unavailable: bool,
}

/// Merge values from at most one vision call into `metrics`.
pub async fn correct_metrics(
    metrics: &mut [MetricRecord],
    screenshot: Option<&Screenshot>,
    corrector: Option<&dyn VisionCorrector>,
    vision_only: &[String],
) -> CorrectionOutcome {
    let requested = needs_correction(metrics, vision_only);
    let mut outcome = CorrectionOutcome {
        requested: requested.len(),
        ..CorrectionOutcome::default()
    };
    if requested.is_empty() {
        return outcome;
    }
    let (Some(screenshot), Some(corrector)) = (screenshot, corrector) else {
        info!(requested = requested.len(), "No screenshot or vision client, skipping correction");
        return outcome;
    };

    let values = match corrector.correct(screenshot, &requested).await {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Vision correction unavailable, keeping parsed values");
            outcome.unavailable = true;
            return outcome;
        }
    };

    for metric in metrics.iter_mut() {
        if !requested.contains(&metric.name) {
            continue;
        }
        if let Some(value) = values.get(&metric.name).filter(|v| !is_placeholder(v)) {
            metric.corrected_value = Some(value.clone());
            outcome.corrected += 1;
        }
    }
    info!(
        requested = outcome.requested,
        corrected = outcome.corrected,
        "Applied vision corrections"
    );
    outcome
}

// =============================================================================
// Status rules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    Eq(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
}

impl Condition {
    /// Parse `">= 95"`, `"<90"`, `"= 0"` or `"between 90 95"`.
    pub fn parse(rule: &str) -> Result<Self> {
        let rule = rule.trim();
        if let Some(rest) = rule
            .strip_prefix("between")
            .or_else(|| rule.strip_prefix("Between"))
        {
            let bounds: Vec<f64> = rest
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty() && *s != "and")
                .map(|s| parse_number(s).with_context(|| format!("bad bound {s:?} in {rule:?}")))
                .collect::<Result<_>>()?;
            return match bounds.as_slice() {
                [lo, hi] if lo <= hi => Ok(Condition::Between(*lo, *hi)),
                [lo, hi] => Ok(Condition::Between(*hi, *lo)),
                _ => bail!("expected two bounds in {rule:?}"),
            };
        }

        let (op, rest) = [">=", "<=", "==", ">", "<", "="]
            .iter()
            .find_map(|op| rule.strip_prefix(op).map(|rest| (*op, rest)))
            .with_context(|| format!("unknown operator in rule {rule:?}"))?;
        let n = parse_number(rest.trim()).with_context(|| format!("bad number in rule {rule:?}"))?;
        Ok(match op {
            ">=" => Condition::Ge(n),
            "<=" => Condition::Le(n),
            ">" => Condition::Gt(n),
            "<" => Condition::Lt(n),
            _ => Condition::Eq(n),
        })
    }

    pub fn matches(&self, v: f64) -> bool {
        match *self {
            Condition::Gt(n) => v > n,
            Condition::Ge(n) => v >= n,
            Condition::Lt(n) => v < n,
            Condition::Le(n) => v <= n,
            Condition::Eq(n) => (v - n).abs() < f64::EPSILON,
            Condition::Between(lo, hi) => v >= lo && v <= hi,
        }
    }
}

fn parse_number(s: &str) -> Result<f64> {
    numeric_value(s).with_context(|| format!("not a number: {s:?}"))
}

/// Numeric reading of a displayed value: tolerates `£`, `%`, `,`, a leading
/// `+` and `K`/`M`/`B` magnitude suffixes. Times and text yield `None`.
pub fn numeric_value(display: &str) -> Option<f64> {
    let cleaned: String = display
        .trim()
        .chars()
        .filter(|c| !matches!(c, '£' | '%' | ',' | '+' | ' '))
        .collect();
    let (digits, scale) = match cleaned.chars().last()? {
        'K' | 'k' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' | 'm' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' | 'b' => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = digits.parse().ok()?;
    value.is_finite().then_some(value * scale)
}

/// Status rules for one metric, checked Green, Red, Amber, BelowRange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Threshold {
    pub target: Option<String>,
    pub green: Option<Condition>,
    pub red: Option<Condition>,
    pub amber: Option<Condition>,
    pub below_range: Option<Condition>,
}

impl Threshold {
    pub fn from_config(config: &ThresholdConfig) -> Result<Self> {
        let rule = |r: &Option<String>| r.as_deref().map(Condition::parse).transpose();
        Ok(Self {
            target: config.target.clone(),
            green: rule(&config.green)?,
            red: rule(&config.red)?,
            amber: rule(&config.amber)?,
            below_range: rule(&config.below_range)?,
        })
    }

    pub fn evaluate(&self, display: &str) -> MetricStatus {
        let Some(v) = numeric_value(display) else {
            return MetricStatus::Unknown;
        };
        let ordered = [
            (&self.green, MetricStatus::Green),
            (&self.red, MetricStatus::Red),
            (&self.amber, MetricStatus::Amber),
            (&self.below_range, MetricStatus::BelowRange),
        ];
        ordered
            .into_iter()
            .find(|(cond, _)| cond.is_some_and(|c| c.matches(v)))
            .map(|(_, status)| status)
            .unwrap_or(MetricStatus::Unknown)
    }
}

/// Configured rules for every graded metric.
#[derive(Debug, Clone, Default)]
pub struct Thresholds {
    rules: BTreeMap<String, Threshold>,
}

impl Thresholds {
    pub fn from_config(config: &BTreeMap<String, ThresholdConfig>) -> Result<Self> {
        let rules = config
            .iter()
            .map(|(key, cfg)| {
                if metric_def(key).is_none() {
                    warn!(metric = %key, "Threshold configured for unknown metric");
                }
                Threshold::from_config(cfg)
                    .with_context(|| format!("Invalid thresholds for {key}"))
                    .map(|t| (key.clone(), t))
            })
            .collect::<Result<_>>()?;
        Ok(Self { rules })
    }

    /// Set `status` and `target` on every metric; metrics without rules or
    /// values stay Unknown.
    pub fn evaluate_all(&self, metrics: &mut [MetricRecord]) {
        for metric in metrics.iter_mut() {
            let rule = self.rules.get(&metric.name);
            metric.status = match (rule, metric.value()) {
                (Some(rule), Some(value)) => rule.evaluate(value),
                _ => MetricStatus::Unknown,
            };
            metric.target = rule
                .and_then(|r| r.target.clone())
                .filter(|t| !is_placeholder(t));
        }
    }
}
