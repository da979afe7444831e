use tracing::info;

use dashwatch_common::DashwatchError;

use super::{fail_on_dispatch_error, RunDeps, RunStats};
use crate::card::comment_batch_card;
use crate::dedup::DedupStore;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::guard::ExecutionGuard;
use crate::parse::parse_comments;
use crate::session::fetch_with_reauth;

/// NPS comments: the only pipeline that may overlap itself on a tight
/// schedule, so it runs under the lock file.
pub async fn run(deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let guard = ExecutionGuard::from_minutes(
        &deps.config.paths.lock_file,
        deps.config.guard.stale_after_minutes,
    );
    let lock = guard.acquire()?;
    let result = run_locked(deps).await;
    lock.release();
    result
}

async fn run_locked(deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let capture = fetch_with_reauth(deps.source).await?;
    let parsed = parse_comments(&capture.lines);

    let mut store = DedupStore::load(&deps.config.paths.comments_log)?;
    let mut stats = RunStats {
        parsed: parsed.records.len(),
        anomalies: parsed.anomalies,
        ..RunStats::default()
    };

    let novel = store.filter_novel(parsed.records);
    stats.novel = novel.len();
    if novel.is_empty() {
        info!(parsed = stats.parsed, "No new comments");
        return Ok(stats);
    }

    let dispatcher = Dispatcher::new(deps.chat, DispatchPolicy::from(&deps.config.comments))
        .with_noun("comments");
    stats.dispatch = dispatcher
        .dispatch(novel, &mut store, comment_batch_card)
        .await?;

    fail_on_dispatch_error(stats)
}
