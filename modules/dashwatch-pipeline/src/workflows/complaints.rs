use tracing::info;

use dashwatch_common::DashwatchError;

use super::{fail_on_dispatch_error, RunDeps, RunStats};
use crate::card::complaint_batch_card;
use crate::dedup::DedupStore;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::parse::parse_complaints;
use crate::session::fetch_with_reauth;

/// Customer complaints, keyed by case number. Commits follow confirmed
/// batches exactly as for comments.
pub async fn run(deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let capture = fetch_with_reauth(deps.source).await?;
    let parsed = parse_complaints(&capture.lines);

    let mut store = DedupStore::load(&deps.config.paths.complaints_log)?;
    let mut stats = RunStats {
        parsed: parsed.records.len(),
        anomalies: parsed.anomalies,
        ..RunStats::default()
    };

    let novel = store.filter_novel(parsed.records);
    stats.novel = novel.len();
    if novel.is_empty() {
        info!(parsed = stats.parsed, "No new complaints");
        return Ok(stats);
    }

    let dispatcher = Dispatcher::new(deps.chat, DispatchPolicy::from(&deps.config.complaints))
        .with_noun("complaints");
    stats.dispatch = dispatcher
        .dispatch(novel, &mut store, complaint_batch_card)
        .await?;

    fail_on_dispatch_error(stats)
}
