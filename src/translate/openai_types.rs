//! Type definitions for the OpenRouter (OpenAI-compatible) Chat Completions API.
//!
//! Only the subset the image model needs: multimodal user content on the way out,
//! and the message text plus any attached `images` on the way back.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what we send TO the provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Fresh per request so identical prompts never hit a provider-side cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// `url` is either a `data:` URI or an http(s) URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

// ---------------------------------------------------------------------------
// Response types (what we receive FROM the provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    /// Some models return an array of parts instead of a string; only the
    /// string form is meaningful to the classifier.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    /// Generated images attached by image-capable models.
    #[serde(default)]
    pub images: Vec<AttachedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedImage {
    #[serde(default)]
    pub image_url: Option<ImageUrl>,
}

impl ChoiceMessage {
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(serde_json::Value::as_str)
    }

    pub fn first_image_url(&self) -> Option<&str> {
        self.images
            .first()
            .and_then(|img| img.image_url.as_ref())
            .map(|u| u.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Account info (`GET /key`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfoResponse {
    pub data: KeyInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Absent when the provider did not report usage; never read as zero.
    #[serde(default)]
    pub usage: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub limit_remaining: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: vec![
                    ContentPart::text("hi"),
                    ContentPart::image("data:image/png;base64,AAAA"),
                ],
            }],
            temperature: Some(0.5),
            max_tokens: None,
            seed: Some(7),
        };

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "model": "m",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "hi"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                    ]
                }],
                "temperature": 0.5,
                "seed": 7
            })
        );
    }

    #[test]
    fn test_parse_image_response() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "gen-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,QQ=="}}]
                },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let message = resp.choices[0].message.as_ref().unwrap();
        assert_eq!(message.first_image_url(), Some("data:image/png;base64,QQ=="));
        assert_eq!(message.text(), Some(""));
    }

    #[test]
    fn test_parse_key_info() {
        let info: KeyInfoResponse = serde_json::from_value(json!({
            "data": {"label": "sk-or-v1-abc", "usage": 0.25, "limit": null, "is_free_tier": true}
        }))
        .unwrap();
        assert_eq!(info.data.usage, Some(0.25));
        assert_eq!(info.data.limit, None);

        let info: KeyInfoResponse =
            serde_json::from_value(json!({"data": {"limit": null}})).unwrap();
        assert_eq!(info.data.usage, None);
    }
}
