use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use chat_webhook::WebhookError;
use dashwatch_common::file_config::DispatchConfig;
use dashwatch_common::{DashwatchError, Keyed};

use crate::dedup::DedupStore;
use crate::notify::ChatBackend;

/// Batch and retry limits for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPolicy {
    pub batch_size: usize,
    pub per_run_cap: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    pub batch_pause: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(c: &DispatchConfig) -> Self {
        Self {
            batch_size: c.batch_size.max(1),
            per_run_cap: c.per_run_cap,
            max_attempts: c.max_attempts.max(1),
            base_backoff: Duration::from_secs_f64(c.base_backoff_secs.max(0.0)),
            backoff_factor: c.backoff_factor.max(1.0),
            max_backoff: Duration::from_secs_f64(c.max_backoff_secs.max(0.0)),
            batch_pause: Duration::from_millis(c.batch_pause_ms),
        }
    }
}

/// Position of one batch within the run, for card titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    pub index: usize,
    /// 1-based position of the first record in the batch.
    pub first: usize,
    pub last: usize,
    /// Records being sent this run, after the cap.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub batch: usize,
    pub attempts: u32,
    pub reason: String,
}

impl From<DispatchFailure> for DashwatchError {
    fn from(f: DispatchFailure) -> Self {
        DashwatchError::DispatchFailure {
            batch: f.batch,
            attempts: f.attempts,
            reason: f.reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub batches_sent: usize,
    pub records_sent: usize,
    /// Novel records held back by the per-run cap.
    pub deferred: usize,
    pub failure: Option<DispatchFailure>,
}

impl std::fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batches={}, sent={}, deferred={}, failed={}",
            self.batches_sent,
            self.records_sent,
            self.deferred,
            self.failure.is_some()
        )
    }
}

/// Sends novel records in capped, fixed-size batches and commits each batch
/// to the dedup log only after the webhook accepted it.
pub struct Dispatcher<'a> {
    backend: &'a dyn ChatBackend,
    policy: DispatchPolicy,
    noun: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(backend: &'a dyn ChatBackend, policy: DispatchPolicy) -> Self {
        Self {
            backend,
            policy,
            noun: "records",
        }
    }

    /// What the records are called in the deferred notice.
    pub fn with_noun(mut self, noun: &'a str) -> Self {
        self.noun = noun;
        self
    }

    /// Returns `Err` only when a confirmed batch could not be committed.
    /// Delivery failures are reported in [`DispatchReport::failure`].
    pub async fn dispatch<T, F>(
        &self,
        mut records: Vec<T>,
        store: &mut DedupStore,
        render: F,
    ) -> Result<DispatchReport, DashwatchError>
    where
        T: Keyed + Serialize,
        F: Fn(BatchInfo, &[T]) -> Value,
    {
        let mut report = DispatchReport::default();
        if records.len() > self.policy.per_run_cap {
            report.deferred = records.len() - self.policy.per_run_cap;
            records.truncate(self.policy.per_run_cap);
            info!(
                sending = records.len(),
                deferred = report.deferred,
                "Per-run cap reached, deferring the rest"
            );
        }

        let total = records.len();
        for (index, batch) in records.chunks(self.policy.batch_size).enumerate() {
            if index > 0 && !self.policy.batch_pause.is_zero() {
                tokio::time::sleep(self.policy.batch_pause).await;
            }

            let first = index * self.policy.batch_size + 1;
            let info = BatchInfo {
                index,
                first,
                last: first + batch.len() - 1,
                total,
            };
            let payload = render(info, batch);

            match self.send_with_retry(&payload, index).await {
                Ok(attempts) => {
                    store.commit(batch)?;
                    report.batches_sent += 1;
                    report.records_sent += batch.len();
                    info!(
                        batch = index,
                        first = info.first,
                        last = info.last,
                        total,
                        attempts,
                        "Sent batch"
                    );
                }
                Err(failure) => {
                    warn!(
                        batch = failure.batch,
                        attempts = failure.attempts,
                        reason = %failure.reason,
                        "Abandoning remaining batches"
                    );
                    report.failure = Some(failure);
                    return Ok(report);
                }
            }
        }

        if report.deferred > 0 {
            let notice = json!({
                "text": format!(
                    "ℹ️ {} additional {} deferred to next runs (rate safety).",
                    report.deferred, self.noun
                )
            });
            if let Err(failure) = self.send_with_retry(&notice, usize::MAX).await {
                warn!(reason = %failure.reason, "Failed to post deferred notice");
            }
        }

        Ok(report)
    }

    /// Post one payload, retrying rate limits and transport errors with
    /// exponential backoff. Returns the number of attempts used.
    async fn send_with_retry(&self, payload: &Value, batch: usize) -> Result<u32, DispatchFailure> {
        let mut delay = self.policy.base_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.backend.post(payload).await {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                return Err(DispatchFailure {
                    batch,
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let wait = match err {
                WebhookError::RateLimited {
                    retry_after: Some(after),
                } => after.min(self.policy.max_backoff),
                _ => delay,
            };
            warn!(
                batch,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Webhook post failed, backing off"
            );
            tokio::time::sleep(wait).await;
            delay = delay
                .mul_f64(self.policy.backoff_factor)
                .min(self.policy.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChat;
    use dashwatch_common::CommentRecord;

    fn records(n: usize) -> Vec<CommentRecord> {
        (0..n)
            .map(|i| CommentRecord {
                store: format!("{i} Store"),
                timestamp: "2025-03-01".into(),
                score: 9,
                comment: format!("comment {i}"),
            })
            .collect()
    }

    fn fast_policy(batch_size: usize, per_run_cap: usize) -> DispatchPolicy {
        DispatchPolicy {
            batch_size,
            per_run_cap,
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            backoff_factor: 1.7,
            max_backoff: Duration::from_millis(5),
            batch_pause: Duration::ZERO,
        }
    }

    fn render(info: BatchInfo, batch: &[CommentRecord]) -> Value {
        json!({ "first": info.first, "last": info.last, "total": info.total, "n": batch.len() })
    }

    #[tokio::test]
    async fn cap_then_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("log.jsonl")).unwrap();
        let chat = RecordingChat::new();
        let dispatcher = Dispatcher::new(&chat, fast_policy(10, 22)).with_noun("comments");

        let report = dispatcher.dispatch(records(25), &mut store, render).await.unwrap();

        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.records_sent, 22);
        assert_eq!(report.deferred, 3);
        assert!(report.failure.is_none());

        let sent = chat.payloads();
        let sizes: Vec<_> = sent[..3].iter().map(|p| p["n"].as_u64().unwrap()).collect();
        assert_eq!(sizes, vec![10, 10, 2]);
        assert_eq!(sent[2]["first"], 21);
        assert_eq!(sent[2]["total"], 22);
        assert_eq!(
            sent[3]["text"],
            "ℹ️ 3 additional comments deferred to next runs (rate safety)."
        );
        assert_eq!(store.len(), 22);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("log.jsonl")).unwrap();
        let chat = RecordingChat::new()
            .then_fail(WebhookError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            })
            .then_fail(WebhookError::Timeout);
        let dispatcher = Dispatcher::new(&chat, fast_policy(10, 30));

        let report = dispatcher.dispatch(records(3), &mut store, render).await.unwrap();

        assert_eq!(report.batches_sent, 1);
        assert_eq!(chat.attempts(), 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_halt_and_commit_only_confirmed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("log.jsonl")).unwrap();
        let chat = RecordingChat::new()
            .then_ok()
            .then_fail(WebhookError::RateLimited { retry_after: None })
            .then_fail(WebhookError::RateLimited { retry_after: None })
            .then_fail(WebhookError::RateLimited { retry_after: None });
        let dispatcher = Dispatcher::new(&chat, fast_policy(2, 30));

        let report = dispatcher.dispatch(records(6), &mut store, render).await.unwrap();

        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.records_sent, 2);
        let failure = report.failure.expect("dispatch failure");
        assert_eq!(failure.batch, 1);
        assert_eq!(failure.attempts, 3);
        assert_eq!(chat.attempts(), 4);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("log.jsonl")).unwrap();
        let chat = RecordingChat::new().then_fail(WebhookError::Api {
            status: 400,
            message: "bad card".into(),
        });
        let dispatcher = Dispatcher::new(&chat, fast_policy(10, 30));

        let report = dispatcher.dispatch(records(2), &mut store, render).await.unwrap();

        assert_eq!(chat.attempts(), 1);
        assert_eq!(report.failure.map(|f| f.attempts), Some(1));
        assert!(store.is_empty());
    }

    #[test]
    fn policy_from_config_clamps() {
        let policy = DispatchPolicy::from(&DispatchConfig {
            batch_size: 0,
            max_attempts: 0,
            ..DispatchConfig::default()
        });
        assert_eq!(policy.batch_size, 1);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }
}
