use serde_json::{Map, Value};

use crate::error::{AiError, Result};

/// Longest error body kept from a failed API call.
pub(crate) const ERROR_BODY_LIMIT: usize = 300;

/// Shorten `text` to at most `limit` bytes without splitting a character.
pub(crate) fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let end = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= limit)
        .last()
        .unwrap_or(0);
    &text[..end]
}

/// Pull the first JSON object out of a model reply.
///
/// Vision replies sometimes arrive inside a ```json fence or with a sentence
/// around them; everything outside the outermost braces is ignored.
pub fn parse_json_object(reply: &str) -> Result<Map<String, Value>> {
    let open = reply
        .find('{')
        .ok_or_else(|| AiError::Parse("no JSON object in reply".to_string()))?;
    let close = reply
        .rfind('}')
        .filter(|close| *close > open)
        .ok_or_else(|| AiError::Parse("unterminated JSON object in reply".to_string()))?;

    match serde_json::from_str::<Value>(&reply[open..=close])? {
        Value::Object(map) => Ok(map),
        other => Err(AiError::Parse(format!("expected object, got {other}"))),
    }
}
