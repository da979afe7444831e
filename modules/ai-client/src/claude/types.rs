//! Wire shapes for a single-turn image + prompt exchange.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: [UserTurn; 1],
}

impl ChatRequest {
    /// One user turn carrying the image first, then the prompt.
    pub fn vision(model: &str, image: ImageSource, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            system: None,
            messages: [UserTurn {
                role: "user",
                content: vec![
                    ContentBlock::Image { source: image },
                    ContentBlock::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UserTurn {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ImageSource {
    #[serde(rename = "type")]
    pub encoding: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: &str, data: String) -> Self {
        Self {
            encoding: "base64".to_string(),
            media_type: media_type.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ChatResponse {
    /// First text block of the reply.
    pub fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_precedes_prompt() {
        let image = ImageSource::base64("image/png", "AAAA".to_string());
        let request = ChatRequest::vision("claude-test", image, "read the dials");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        let blocks = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "image");
        assert_eq!(blocks[0]["source"]["type"], "base64");
        assert_eq!(blocks[0]["source"]["media_type"], "image/png");
        assert_eq!(blocks[1]["type"], "text");
        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn reply_text_skips_unknown_blocks() {
        let raw = r#"{"content":[{"type":"thinking","thinking":"x"},{"type":"text","text":"{}"}],"stop_reason":"end_turn"}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.into_text().as_deref(), Some("{}"));
    }
}
