//! Line-oriented parsers for the three dashboard views.
//!
//! Each parser is a tagged state enum plus a pure `step(state, line)`
//! transition. The drivers here only fold lines through `step` and collect
//! what it emits.

pub mod comments;
pub mod complaints;
pub mod metrics;

/// Records recovered from one capture, plus how many malformed ones were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub anomalies: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            anomalies: 0,
        }
    }
}

/// Side effect of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<T> {
    None,
    Emit(T),
    /// A partially built record was abandoned.
    Discard(&'static str),
}

impl<T> Parsed<T> {
    pub(crate) fn apply(&mut self, effect: Effect<T>) {
        match effect {
            Effect::None => {}
            Effect::Emit(record) => self.records.push(record),
            Effect::Discard(reason) => {
                self.anomalies += 1;
                tracing::debug!(reason, "Dropped malformed record");
            }
        }
    }
}

pub use comments::parse_comments;
pub use complaints::parse_complaints;
pub use metrics::parse_daily_report;
