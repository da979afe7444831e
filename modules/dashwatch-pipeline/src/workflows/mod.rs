//! One workflow per dashboard view. Each runs capture → parse → dedup →
//! dispatch against the collaborators in [`RunDeps`]; fatal errors are
//! reported through the alert sink by [`run`].

pub mod comments;
pub mod complaints;
pub mod daily;
pub mod two_factor;

use std::fmt;

use chrono::NaiveDate;

use dashwatch_common::{DashwatchError, FileConfig};

use crate::correction::{CorrectionOutcome, VisionCorrector};
use crate::dispatch::DispatchReport;
use crate::notify::{AlertSink, ChatBackend};
use crate::session::PageSource;

/// Everything a workflow needs for one invocation.
pub struct RunDeps<'a> {
    pub config: &'a FileConfig,
    /// Content webhook for this pipeline.
    pub chat: &'a dyn ChatBackend,
    pub alerts: &'a AlertSink,
    pub source: &'a dyn PageSource,
    pub vision: Option<&'a dyn VisionCorrector>,
    /// UTC date of the run.
    pub run_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Comments,
    Complaints,
    Daily,
    TwoFactor,
}

impl Pipeline {
    pub fn name(self) -> &'static str {
        match self {
            Pipeline::Comments => "comments",
            Pipeline::Complaints => "complaints",
            Pipeline::Daily => "daily",
            Pipeline::TwoFactor => "two-factor",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub parsed: usize,
    pub anomalies: usize,
    pub novel: usize,
    pub dispatch: DispatchReport,
    pub correction: Option<CorrectionOutcome>,
    pub alerts_sent: usize,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parsed={}, anomalies={}, novel={}, {}",
            self.parsed, self.anomalies, self.novel, self.dispatch
        )?;
        if let Some(c) = &self.correction {
            write!(
                f,
                ", corrections={}/{}{}",
                c.corrected,
                c.requested,
                if c.unavailable { " (vision unavailable)" } else { "" }
            )?;
        }
        if self.alerts_sent > 0 {
            write!(f, ", alerts={}", self.alerts_sent)?;
        }
        Ok(())
    }
}

/// A dispatch that stopped early ends the run as a failure, after the
/// confirmed batches were committed.
pub(crate) fn fail_on_dispatch_error(stats: RunStats) -> Result<RunStats, DashwatchError> {
    match &stats.dispatch.failure {
        Some(failure) => Err(failure.clone().into()),
        None => Ok(stats),
    }
}

/// Run one pipeline, sending any fatal error to the alert webhook.
pub async fn run(pipeline: Pipeline, deps: &RunDeps<'_>) -> Result<RunStats, DashwatchError> {
    let result = match pipeline {
        Pipeline::Comments => comments::run(deps).await,
        Pipeline::Complaints => complaints::run(deps).await,
        Pipeline::Daily => daily::run(deps).await,
        Pipeline::TwoFactor => two_factor::run(deps).await,
    };

    match &result {
        Ok(stats) => tracing::info!(pipeline = %pipeline, %stats, "Run complete"),
        Err(e) => deps.alerts.fatal(pipeline.name(), e).await,
    }
    result
}
