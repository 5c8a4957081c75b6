//! Type definitions for the Gemini `generateContent` / `streamGenerateContent` envelope.
//!
//! Clients built for Gemini send these requests to us and expect these responses back,
//! so field names follow Gemini's camelCase wire format exactly.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what the Gemini client sends TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default, alias = "system_instruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    // Catch-all for generationConfig, safetySettings, tools, ...
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    /// Gemini treats an omitted role as `user`.
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData", alias = "file_data")]
        file_data: FileData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blob {
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileData {
    #[serde(rename = "mimeType", alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "fileUri", alias = "file_uri")]
    pub file_uri: String,
}

// ---------------------------------------------------------------------------
// Response types (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Token counts reported to the client. The provider's real counts are not
/// forwarded; these are fixed placeholders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: u64,
    pub total_token_count: u64,
}

impl UsageMetadata {
    pub const SYNTHETIC: Self = Self {
        prompt_token_count: 264,
        total_token_count: 1578,
    };
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

/// Plain JSON error body used for every non-streaming failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Error chunk written into an already-open event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamErrorChunk {
    pub error: StreamErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamErrorBody {
    pub message: String,
    pub code: u16,
}

impl StreamErrorChunk {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: StreamErrorBody {
                message: message.into(),
                code: 500,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }
}

impl Content {
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gemini_request() {
        let req: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "draw a cat"}]},
                {"role": "model", "parts": [{"inlineData": {"mimeType": "image/png", "data": "AAAA"}}]},
                {"parts": [{"inline_data": {"mime_type": "image/jpeg", "data": "BBBB"}}]}
            ],
            "generationConfig": {"temperature": 0.2}
        }))
        .unwrap();

        assert_eq!(req.contents.len(), 3);
        assert_eq!(req.contents[1].role, Role::Model);
        assert_eq!(req.contents[2].role, Role::User);
        assert_eq!(req.contents[2].parts[0], Part::inline("image/jpeg", "BBBB"));
        assert!(req.extra.contains_key("generationConfig"));
    }

    #[test]
    fn test_response_wire_shape() {
        let resp = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content::model(vec![Part::text("hi"), Part::inline("image/png", "AAAA")]),
                finish_reason: Some("STOP".to_string()),
                index: Some(0),
            }],
            usage_metadata: Some(UsageMetadata::SYNTHETIC),
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [
                            {"text": "hi"},
                            {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
                        ]
                    },
                    "finishReason": "STOP",
                    "index": 0
                }],
                "usageMetadata": {"promptTokenCount": 264, "totalTokenCount": 1578}
            })
        );
    }
}
