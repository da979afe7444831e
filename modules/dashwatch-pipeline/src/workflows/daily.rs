use serde_json::Value;
use tracing::info;

use dashwatch_common::{DailyReport, DashwatchError};

use super::{fail_on_dispatch_error, RunDeps, RunStats};
use crate::card::daily_report_payload;
use crate::correction::{correct_metrics, Thresholds};
use crate::dedup::DedupStore;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::parse::parse_daily_report;
use crate::session::fetch_with_reauth;

/// Daily summary: one card per dashboard refresh. The log doubles as the
/// metric history, one full report per line.
pub async fn run(deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let config = deps.config;
    let thresholds = Thresholds::from_config(&config.thresholds)
        .map_err(|e| DashwatchError::Config(format!("{e:#}")))?;

    let capture = fetch_with_reauth(deps.source).await?;
    let report = parse_daily_report(&capture.lines, deps.run_date);

    // Keyed on the page header: repeats are dropped before any vision read.
    let mut store = DedupStore::load(&config.paths.daily_log)?;
    let Some(mut report) = store.filter_novel(vec![report]).pop() else {
        info!("Daily report already sent for this refresh");
        return Ok(RunStats::default());
    };

    let vision = deps.vision.filter(|_| config.vision.enabled);
    let correction = correct_metrics(
        &mut report.metrics,
        capture.screenshot.as_ref(),
        vision,
        &config.vision.vision_only,
    )
    .await;
    thresholds.evaluate_all(&mut report.metrics);

    let missing = report.metrics.iter().filter(|m| m.is_missing()).count();
    let mut stats = RunStats {
        parsed: report.metrics.len() - missing,
        anomalies: missing,
        novel: 1,
        correction: Some(correction),
        ..RunStats::default()
    };

    let dispatcher = Dispatcher::new(deps.chat, DispatchPolicy::from(&config.daily))
        .with_noun("reports");
    stats.dispatch = dispatcher
        .dispatch(vec![report], &mut store, |_, reports: &[DailyReport]| {
            reports.first().map(daily_report_payload).unwrap_or(Value::Null)
        })
        .await?;

    fail_on_dispatch_error(stats)
}
