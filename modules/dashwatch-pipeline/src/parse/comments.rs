use dashwatch_common::CommentRecord;

use super::{Effect, Parsed};
use crate::patterns::{is_comment_noise, ISO_DATE_RE, NPS_SCORE_RE, STORE_RE};

const EMPTY_COMMENT: &str = "[No text]";

/// Where the parser is within one date → store → text → score window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommentState {
    #[default]
    Seeking,
    Dated {
        date: String,
    },
    InWindow {
        date: String,
        store: String,
        lines: Vec<String>,
    },
}

pub fn step(state: CommentState, line: &str) -> (CommentState, Effect<CommentRecord>) {
    if is_comment_noise(line) {
        return (state, Effect::None);
    }

    if ISO_DATE_RE.is_match(line) {
        let effect = match state {
            CommentState::Seeking => Effect::None,
            CommentState::Dated { .. } => Effect::Discard("date without store"),
            CommentState::InWindow { .. } => Effect::Discard("window without score"),
        };
        return (
            CommentState::Dated {
                date: line.to_string(),
            },
            effect,
        );
    }

    match state {
        CommentState::Seeking => (CommentState::Seeking, Effect::None),

        CommentState::Dated { date } => {
            if STORE_RE.is_match(line) {
                (
                    CommentState::InWindow {
                        date,
                        store: line.to_string(),
                        lines: Vec::new(),
                    },
                    Effect::None,
                )
            } else if NPS_SCORE_RE.is_match(line) {
                (CommentState::Seeking, Effect::Discard("score without store"))
            } else {
                (CommentState::Dated { date }, Effect::None)
            }
        }

        CommentState::InWindow {
            date,
            store,
            mut lines,
        } => {
            if let Some(score) = score_of(line) {
                let text = lines.join("\n");
                let comment = match text.trim() {
                    "" => EMPTY_COMMENT.to_string(),
                    t => t.to_string(),
                };
                let record = CommentRecord {
                    store,
                    timestamp: date,
                    score,
                    comment,
                };
                (CommentState::Seeking, Effect::Emit(record))
            } else {
                lines.push(line.to_string());
                (CommentState::InWindow { date, store, lines }, Effect::None)
            }
        }
    }
}

fn score_of(line: &str) -> Option<u8> {
    if NPS_SCORE_RE.is_match(line) {
        line.parse().ok()
    } else {
        None
    }
}

/// Parse NPS comments from normalised dashboard lines.
pub fn parse_comments(lines: &[String]) -> Parsed<CommentRecord> {
    let mut out = Parsed::default();
    let mut state = CommentState::default();
    for line in lines {
        let (next, effect) = step(state, line);
        out.apply(effect);
        state = next;
    }
    if !matches!(state, CommentState::Seeking) {
        out.apply(Effect::Discard("unterminated window at end of input"));
    }
    tracing::info!(
        comments = out.records.len(),
        dropped = out.anomalies,
        "Parsed comments"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn full_window_emits_record() {
        let parsed = parse_comments(&lines(
            "2025-03-01\n1234 Leeds Kirkstall\nSubmission via: Email\nLovely staff\nvery quick\n9",
        ));
        assert_eq!(
            parsed.records,
            vec![CommentRecord {
                store: "1234 Leeds Kirkstall".into(),
                timestamp: "2025-03-01".into(),
                score: 9,
                comment: "Lovely staff\nvery quick".into(),
            }]
        );
        assert_eq!(parsed.anomalies, 0);
    }

    #[test]
    fn empty_comment_gets_placeholder_text() {
        let parsed = parse_comments(&lines("2025-03-01\n12 York\n3"));
        assert_eq!(parsed.records[0].comment, "[No text]");
        assert_eq!(parsed.records[0].score, 3);
    }

    #[test]
    fn window_interrupted_by_date_is_dropped() {
        let parsed = parse_comments(&lines(
            "2025-03-01\n12 York\nhalf a comment\n2025-03-02\n34 Hull\nfine\n7",
        ));
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].store, "34 Hull");
        assert_eq!(parsed.anomalies, 1);
    }

    #[test]
    fn score_before_store_drops_the_date() {
        let parsed = parse_comments(&lines("2025-03-01\n8\n12 York\nok\n8"));
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.anomalies, 1);
    }

    #[test]
    fn unterminated_window_at_end_is_dropped() {
        let parsed = parse_comments(&lines("2025-03-01\n12 York\nno score"));
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.anomalies, 1);
    }

    #[test]
    fn step_is_pure_over_noise() {
        let state = CommentState::Dated {
            date: "2025-03-01".into(),
        };
        let (next, effect) = step(state.clone(), "Net Promoter Score");
        assert_eq!(next, state);
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn store_like_text_inside_window_is_comment() {
        let parsed = parse_comments(&lines("2025-03-01\n12 York\n2 coffees were cold\n4"));
        assert_eq!(parsed.records[0].comment, "2 coffees were cold");
    }

    #[test]
    fn comments_starting_with_by_are_kept() {
        let parsed = parse_comments(&lines(
            "2025-03-01\n12 York\nBy far the best shop in town\n10\n2025-03-01\n12 York\nBy the time I got served the cafe had shut\n2",
        ));
        let texts: Vec<&str> = parsed.records.iter().map(|r| r.comment.as_str()).collect();
        assert_eq!(
            texts,
            vec!["By far the best shop in town", "By the time I got served the cafe had shut"]
        );
    }
}
