//! Line patterns shared by the dashboard parsers.
//!
//! Every pattern is anchored to a whole, already-normalised line.

use std::sync::LazyLock;

use regex::Regex;

pub use dashwatch_common::{is_placeholder, NO_DATA, PLACEHOLDER};

// --- Comment anchors ---

/// `2025-03-01`
pub static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// A bare 0–10 NPS score.
pub static NPS_SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(10|[0-9])$").expect("valid regex"));

/// `1234 Leeds Kirkstall`: store number then name.
pub static STORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s+\S.*$").expect("valid regex"));

static COMMENT_NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^(?:
            this | last | yesterday | go\ back | regional_manager | privacy | lighthouse
          | highly | satisfied | dissatisfied | ⓘ | net\ promoter\ score
          | this\ year | this\ quarter | this\ period | this\ week
          | google\ home | terms\ of\ service | privacy\ policy
          | monday | tuesday | wednesday | thursday | friday | saturday | sunday
          | the\ last\ \d+\ (?:days|weeks)
          | you\ are\ about\ to.* | the\ data\ on\ this\ report.*
          | showing\ results.* | record\ count.* | your\ weighted\ nps.*
          | satisfaction\ is\ the\ percentage.* | if\ no\ email\ survey\ responses.*
          | submission\ via:.*
        )$",
    )
    .expect("valid regex")
});

// --- Complaint anchors ---

/// `3 Mar 2025, 14:05:09`
pub static COMPLAINT_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d{1,2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{4},\s+\d{2}:\d{2}:\d{2}$")
        .expect("valid regex")
});

pub static CASE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Table row index, e.g. `12.`
pub static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.$").expect("valid regex"));

/// Marks the end of a complaint description and the start of the store response.
pub static RESPONSE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:respond|under review|null)$").expect("valid regex"));

/// Table footer, e.g. `1 - 10 / 42`.
pub static PAGINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s+-\s+\d+\s*/\s*\d+").expect("valid regex"));

pub static COLUMN_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:opened_date|store|case_number|dashboard_business_area|case_type|case_category|case_reason|detailed_case_reason|description|response_url|store_response)$",
    )
    .expect("valid regex")
});

/// Normalise one captured line: NBSP to space, zero-width characters dropped, trimmed.
pub fn normalize_line(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Dashboard chrome that can appear anywhere in the comments table.
pub fn is_comment_noise(line: &str) -> bool {
    COMMENT_NOISE_RE.is_match(line)
}

/// Lines the complaint parser skips in every state.
pub fn is_complaint_chrome(line: &str) -> bool {
    line.is_empty() || PAGINATION_RE.is_match(line) || COLUMN_HEADER_RE.is_match(line)
}
