use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Glyph written in place of a value the parser could not find.
pub const PLACEHOLDER: &str = "—";

/// Sentinel the dashboard itself renders when a widget has no data.
pub const NO_DATA: &str = "No data";

/// True for values that carry no information: empty, a dash, or the no-data sentinel.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == "-" || v == PLACEHOLDER || v.eq_ignore_ascii_case(NO_DATA)
}

/// Anything the dedup log can remember.
pub trait Keyed {
    fn dedup_key(&self) -> String;
}

// --- Comments ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub store: String,
    pub timestamp: String,
    pub score: u8,
    pub comment: String,
}

impl Keyed for CommentRecord {
    fn dedup_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.store, self.timestamp, self.comment)
    }
}

// --- Complaints ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub case_number: String,
    pub date: String,
    pub store: String,
    pub business_area: String,
    pub case_type: String,
    pub category: String,
    pub reason: String,
    pub detailed_reason: String,
    pub description: String,
    pub response: String,
}

impl Keyed for ComplaintRecord {
    fn dedup_key(&self) -> String {
        self.case_number.clone()
    }
}

// --- Daily metrics ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Green,
    Red,
    Amber,
    BelowRange,
    #[default]
    Unknown,
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricStatus::Green => write!(f, "green"),
            MetricStatus::Red => write!(f, "red"),
            MetricStatus::Amber => write!(f, "amber"),
            MetricStatus::BelowRange => write!(f, "below_range"),
            MetricStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub label: String,
    pub section: String,
    pub raw_value: Option<String>,
    pub corrected_value: Option<String>,
    #[serde(default)]
    pub status: MetricStatus,
    /// Target shown beside the value when the metric is graded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl MetricRecord {
    /// The value to display: a real correction wins over the parsed text.
    pub fn value(&self) -> Option<&str> {
        fn real(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !is_placeholder(s))
        }
        real(&self.corrected_value).or_else(|| real(&self.raw_value))
    }

    pub fn is_missing(&self) -> bool {
        self.value().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub page_timestamp: String,
    pub period_range: String,
    pub store_line: String,
    pub run_date: NaiveDate,
    pub metrics: Vec<MetricRecord>,
}

impl DailyReport {
    pub fn metric(&self, name: &str) -> Option<&MetricRecord> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

impl Keyed for DailyReport {
    fn dedup_key(&self) -> String {
        if is_placeholder(&self.page_timestamp) {
            format!("{}|{}", self.run_date, self.period_range)
        } else {
            format!("{}|{}", self.page_timestamp, self.period_range)
        }
    }
}
