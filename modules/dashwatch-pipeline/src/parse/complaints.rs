use dashwatch_common::ComplaintRecord;

use super::{Effect, Parsed};
use crate::patterns::{
    is_complaint_chrome, CASE_NUMBER_RE, COMPLAINT_DATE_RE, LIST_ITEM_RE, RESPONSE_MARKER_RE,
};

pub const MAX_DESCRIPTION_CHARS: usize = 700;
pub const MAX_RESPONSE_CHARS: usize = 500;
pub const NO_RESPONSE: &str = "[No response recorded]";
const TRUNCATION_SUFFIX: &str = "… (truncated)";

/// Header fields that follow the case number, in dashboard column order.
const HEADER_FIELDS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComplaintState {
    #[default]
    SeekingStart,
    FoundDate {
        date: String,
        store: Option<String>,
    },
    FoundCase {
        draft: ComplaintRecord,
        filled: usize,
    },
    ReadingDescription {
        draft: ComplaintRecord,
        description: Vec<String>,
    },
    ReadingResponse {
        draft: ComplaintRecord,
        description: Vec<String>,
        response: Vec<String>,
    },
}

fn open(date: &str) -> ComplaintState {
    ComplaintState::FoundDate {
        date: date.to_string(),
        store: None,
    }
}

pub fn step(state: ComplaintState, line: &str) -> (ComplaintState, Effect<ComplaintRecord>) {
    use ComplaintState::*;

    if is_complaint_chrome(line) {
        return (state, Effect::None);
    }
    let is_date = COMPLAINT_DATE_RE.is_match(line);
    let is_list_item = LIST_ITEM_RE.is_match(line);

    match state {
        SeekingStart if is_date => (open(line), Effect::None),
        SeekingStart => (SeekingStart, Effect::None),

        FoundDate { .. } if is_date => (open(line), Effect::Discard("date before case number")),
        FoundDate { .. } if is_list_item => (SeekingStart, Effect::Discard("row ended before case number")),
        // Store cells may be bare numbers; the first line after the date is the store.
        FoundDate { date, store: None } => (
            FoundDate {
                date,
                store: Some(line.to_string()),
            },
            Effect::None,
        ),
        FoundDate {
            date,
            store: Some(store),
        } if CASE_NUMBER_RE.is_match(line) => {
            let draft = ComplaintRecord {
                case_number: line.to_string(),
                date,
                store,
                ..ComplaintRecord::default()
            };
            (FoundCase { draft, filled: 0 }, Effect::None)
        }
        FoundDate { store: Some(_), .. } => (SeekingStart, Effect::Discard("unexpected line after store")),

        FoundCase { .. } if is_date => (open(line), Effect::Discard("row header cut short")),
        FoundCase { .. } if is_list_item => (SeekingStart, Effect::Discard("row header cut short")),
        FoundCase { mut draft, filled } => {
            let value = line.to_string();
            match filled {
                0 => draft.business_area = value,
                1 => draft.case_type = value,
                2 => draft.category = value,
                3 => draft.reason = value,
                _ => draft.detailed_reason = value,
            }
            if filled + 1 == HEADER_FIELDS {
                (
                    ReadingDescription {
                        draft,
                        description: Vec::new(),
                    },
                    Effect::None,
                )
            } else {
                (
                    FoundCase {
                        draft,
                        filled: filled + 1,
                    },
                    Effect::None,
                )
            }
        }

        ReadingDescription { draft, description } if is_date || is_list_item => {
            let record = finish(draft, &description, &[]);
            let next = if is_date { open(line) } else { SeekingStart };
            (next, Effect::Emit(record))
        }
        ReadingDescription { draft, description } if RESPONSE_MARKER_RE.is_match(line) => (
            ReadingResponse {
                draft,
                description,
                response: Vec::new(),
            },
            Effect::None,
        ),
        ReadingDescription {
            draft,
            mut description,
        } => {
            description.push(line.to_string());
            (ReadingDescription { draft, description }, Effect::None)
        }

        ReadingResponse {
            draft,
            description,
            response,
        } if is_date || is_list_item => {
            let record = finish(draft, &description, &response);
            let next = if is_date { open(line) } else { SeekingStart };
            (next, Effect::Emit(record))
        }
        ReadingResponse {
            draft,
            description,
            mut response,
        } => {
            if !line.eq_ignore_ascii_case("null") {
                response.push(line.to_string());
            }
            (
                ReadingResponse {
                    draft,
                    description,
                    response,
                },
                Effect::None,
            )
        }
    }
}

/// Close whatever is open at end of input.
fn finish_input(state: ComplaintState) -> Effect<ComplaintRecord> {
    match state {
        ComplaintState::SeekingStart => Effect::None,
        ComplaintState::ReadingDescription { draft, description } => {
            Effect::Emit(finish(draft, &description, &[]))
        }
        ComplaintState::ReadingResponse {
            draft,
            description,
            response,
        } => Effect::Emit(finish(draft, &description, &response)),
        ComplaintState::FoundDate { .. } | ComplaintState::FoundCase { .. } => {
            Effect::Discard("input ended inside row header")
        }
    }
}

fn finish(mut draft: ComplaintRecord, description: &[String], response: &[String]) -> ComplaintRecord {
    draft.description = truncate(description.join("\n").trim(), MAX_DESCRIPTION_CHARS);
    draft.response = match response.join("\n").trim() {
        "" => NO_RESPONSE.to_string(),
        text => truncate(text, MAX_RESPONSE_CHARS),
    };
    draft
}

/// Cut `text` to at most `max` characters. Truncated text ends with a marker
/// and still fits within `max`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let head: String = text.chars().take(keep).collect();
    format!("{}{TRUNCATION_SUFFIX}", head.trim_end())
}

/// Parse complaint rows from normalised dashboard lines.
pub fn parse_complaints(lines: &[String]) -> Parsed<ComplaintRecord> {
    let mut out = Parsed::default();
    let mut state = ComplaintState::default();
    for line in lines {
        let (next, effect) = step(state, line);
        out.apply(effect);
        state = next;
    }
    out.apply(finish_input(state));
    tracing::info!(
        complaints = out.records.len(),
        dropped = out.anomalies,
        "Parsed complaints"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.trim().to_string()).collect()
    }

    fn row(n: usize, case: &str, description: &str, response: Option<&str>) -> String {
        let mut s = format!(
            "{n}.\n3 Mar 2025, 14:05:0{n}\n1234 Leeds\n{case}\nCustomer Service\nComplaint\nStaff\nAttitude\nRude at till\n{description}\n"
        );
        if let Some(response) = response {
            s.push_str(&format!("Respond\n{response}\n"));
        }
        s
    }

    #[test]
    fn header_fields_land_in_order() {
        let parsed = parse_complaints(&lines(&row(1, "555", "Long wait", Some("Apologised"))));
        assert_eq!(parsed.records.len(), 1);
        let c = &parsed.records[0];
        assert_eq!(c.case_number, "555");
        assert_eq!(c.date, "3 Mar 2025, 14:05:01");
        assert_eq!(c.store, "1234 Leeds");
        assert_eq!(c.business_area, "Customer Service");
        assert_eq!(c.case_type, "Complaint");
        assert_eq!(c.category, "Staff");
        assert_eq!(c.reason, "Attitude");
        assert_eq!(c.detailed_reason, "Rude at till");
        assert_eq!(c.description, "Long wait");
        assert_eq!(c.response, "Apologised");
    }

    #[test]
    fn missing_response_gets_default() {
        let text = format!("{}{}", row(1, "1", "First", None), row(2, "2", "Second", None));
        let parsed = parse_complaints(&lines(&text));
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.records.iter().all(|c| c.response == NO_RESPONSE));
    }

    #[test]
    fn null_response_lines_are_skipped() {
        let parsed = parse_complaints(&lines(&row(1, "9", "Desc", Some("null"))));
        assert_eq!(parsed.records[0].response, NO_RESPONSE);
    }

    #[test]
    fn non_case_line_after_store_is_discarded_without_poisoning_the_rest() {
        let text = format!(
            "1.\n3 Mar 2025, 10:00:00\n777\nnoise\n{}",
            row(2, "888", "Fine", Some("Done"))
        );
        let parsed = parse_complaints(&lines(&text));
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].case_number, "888");
        assert_eq!(parsed.anomalies, 1);
    }

    #[test]
    fn description_wraps_across_lines() {
        let text = row(1, "42", "Line one\nLine two", Some("Reply one\nReply two"));
        let parsed = parse_complaints(&lines(&text));
        assert_eq!(parsed.records[0].description, "Line one\nLine two");
        assert_eq!(parsed.records[0].response, "Reply one\nReply two");
    }

    #[test]
    fn truncate_fits_within_max() {
        let long = "x".repeat(900);
        let cut = truncate(&long, MAX_DESCRIPTION_CHARS);
        assert_eq!(cut.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(cut.ends_with("… (truncated)"));
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn unfinished_header_at_end_is_an_anomaly() {
        let parsed = parse_complaints(&lines("1.\n3 Mar 2025, 10:00:00\n1234 Leeds\n42\nArea"));
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.anomalies, 1);
    }

    #[test]
    fn numeric_store_cells_are_stores() {
        let text = "1.\n3 Mar 2025, 10:00:00\n218\n9001\nArea\nComplaint\nProduct\nQuality\nDamaged\nBox crushed\n\
                    2.\n3 Mar 2025, 11:00:00\n219\n9002\nArea\nComplaint\nProduct\nQuality\nStale\nBread was old\n";
        let parsed = parse_complaints(&lines(text));
        assert_eq!(parsed.anomalies, 0);
        let rows: Vec<(&str, &str)> = parsed
            .records
            .iter()
            .map(|c| (c.store.as_str(), c.case_number.as_str()))
            .collect();
        assert_eq!(rows, vec![("218", "9001"), ("219", "9002")]);
    }
}
