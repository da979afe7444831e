//! Number-matching sign-in prompts: detect the challenge page and pull out the
//! number the user has to tap on their phone.

const CHALLENGE_PHRASES: &[&str] = &[
    "match the number",
    "tap the number shown",
    "verify it's you",
    "check your phone",
];

/// Words that precede a model number rather than a code ("Pixel 8", "iPhone 15").
const DEVICE_WORDS: &[&str] = &[
    "pixel", "iphone", "galaxy", "note", "android", "ios", "ipad", "model",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorCode {
    pub code: String,
    /// Every candidate seen on the page, in order, without repeats.
    pub options: Vec<String>,
}

pub fn detect_challenge(text: &str) -> bool {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    CHALLENGE_PHRASES.iter().any(|p| lower.contains(p))
}

fn glued(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphabetic() || c == '-')
}

fn follows_device_word(before: &str) -> bool {
    before
        .split_whitespace()
        .next_back()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .is_some_and(|w| DEVICE_WORDS.contains(&w.as_str()))
}

/// Standalone 2–3 digit numbers in `text`, in order.
fn candidates(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if !c.is_ascii_digit() {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + d.len_utf8();
            chars.next();
        }

        let run = &text[start..end];
        let before = &text[..start];
        if !(2..=3).contains(&run.len())
            || glued(before.chars().next_back())
            || glued(text[end..].chars().next())
            || follows_device_word(before)
        {
            continue;
        }
        if !found.iter().any(|f| f == run) {
            found.push(run.to_string());
        }
    }
    found
}

/// The number to tap: the first two-digit candidate, else the first candidate.
pub fn extract_code(text: &str) -> Option<TwoFactorCode> {
    let options = candidates(text);
    let code = options
        .iter()
        .find(|c| c.len() == 2)
        .or_else(|| options.first())?
        .clone();
    Some(TwoFactorCode { code, options })
}

/// Lines for the alert webhook.
pub fn alert_lines(code: Option<&TwoFactorCode>) -> Vec<String> {
    match code {
        Some(code) => {
            let mut lines = vec![
                "⚠️ Dashboard sign-in needs approval.".to_string(),
                format!("🔐 2FA code to tap on your phone: *{}*", code.code),
            ];
            if code.options.len() > 1 {
                lines.push(format!("• Options on screen: {}", code.options.join(", ")));
            }
            lines
        }
        None => vec![
            "⏳ 2FA challenge detected, but no code could be read.".to_string(),
            "• Please approve on your phone; tap the matching number.".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_challenge_with_curly_apostrophe() {
        assert!(detect_challenge("Verify it\u{2019}s you\nOpen the app"));
        assert!(detect_challenge("Tap the number shown below"));
        assert!(!detect_challenge("Welcome back"));
    }

    #[test]
    fn ignores_device_models() {
        let text = "Check your phone\nGoogle sent a notification to your Pixel 8 Pro and Galaxy S23 (SM-G991B)\niPhone 15\nTap 47 on your phone";
        let code = extract_code(text).unwrap();
        assert_eq!(code.code, "47");
        assert_eq!(code.options, vec!["47"]);
    }

    #[test]
    fn prefers_two_digit_and_lists_options() {
        let code = extract_code("Match the number\n123\n58\n123").unwrap();
        assert_eq!(code.code, "58");
        assert_eq!(code.options, vec!["123", "58"]);
    }

    #[test]
    fn falls_back_to_three_digits() {
        assert_eq!(extract_code("Tap 905").unwrap().code, "905");
    }

    #[test]
    fn no_candidates() {
        assert!(extract_code("Tap 1 or 2024 on Model 42").is_none());
    }

    #[test]
    fn alert_lines_without_code() {
        let lines = alert_lines(None);
        assert!(lines[0].starts_with("⏳"));
    }
}
