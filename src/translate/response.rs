//! Classify OpenRouter responses and render them as Gemini documents.
//!
//! The provider does not report "I made an image" in one uniform way, so the
//! classifier is an ordered list of rules; the first rule that matches wins.

use once_cell::sync::Lazy;
use regex::Regex;

use super::gemini_types::{
    Candidate, Content, FileData, GenerateContentResponse, Part, UsageMetadata,
};
use super::openai_types::{ChatCompletionResponse, ChoiceMessage};

/// Text streamed or returned alongside a generated image.
pub const IMAGE_PLACEHOLDER: &str = "Generated image";
/// Returned when the provider answered with no usable content.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "[No valid response received]";
/// Returned when an image result cannot be turned into a Gemini part.
pub const IMAGE_PARSE_FAILED: &str = "[Failed to parse image]";

pub const FINISH_REASON_STOP: &str = "STOP";

static DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(.+);base64,(.*)$").expect("valid data URI pattern"));

static IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(https?://[^\s"'<>()\[\]?#]+\.(?:jpe?g|png|webp)(?:\?[^\s"'<>()\[\]]*[^\s"'<>()\[\].,;:!])?)(?:[\s"'<>()\[\]#]|[.,;:!]+(?:\s|$)|$)"#,
    )
    .expect("valid image URL pattern")
});

static CLAIMS_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(here(?: is|'s) (?:the|your|an?) (?:generated |edited )?image|i(?:'ve| have) (?:generated|created|drawn|edited)|generating (?:the |an? |your )?image|image (?:is|has been) (?:generated|created)|生成图像|生成图片|图片已生成)",
    )
    .expect("valid image claim pattern")
});

/// What the upstream call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// A `data:` URI or a remote URL.
    Image(String),
    Text(String),
}

impl GenerationResult {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationResult::Image(_) => "image",
            GenerationResult::Text(_) => "text",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            GenerationResult::Image(p) | GenerationResult::Text(p) => p,
        }
    }
}

pub type Rule = fn(&ChoiceMessage) -> Option<GenerationResult>;

/// Classification rules in priority order.
pub const RULES: &[(&str, Rule)] = &[
    ("attached_image", attached_image),
    ("data_uri_text", data_uri_text),
    ("image_url_in_text", image_url_in_text),
    ("claims_image_without_one", claims_image_without_one),
    ("plain_text", plain_text),
];

/// Classify a provider message. Falls back to [`EMPTY_RESPONSE_PLACEHOLDER`].
pub fn classify_message(message: Option<&ChoiceMessage>) -> GenerationResult {
    if let Some(message) = message {
        for (name, rule) in RULES {
            if let Some(result) = rule(message) {
                tracing::debug!(rule = name, kind = result.kind(), "Classified provider response");
                return result;
            }
        }
    }
    tracing::debug!(rule = "empty", "Classified provider response");
    GenerationResult::Text(EMPTY_RESPONSE_PLACEHOLDER.to_string())
}

pub fn classify_response(resp: &ChatCompletionResponse) -> GenerationResult {
    classify_message(resp.choices.first().and_then(|c| c.message.as_ref()))
}

fn attached_image(message: &ChoiceMessage) -> Option<GenerationResult> {
    message
        .first_image_url()
        .map(|url| GenerationResult::Image(url.to_string()))
}

fn data_uri_text(message: &ChoiceMessage) -> Option<GenerationResult> {
    message
        .text()
        .filter(|text| text.starts_with("data:image/"))
        .map(|text| GenerationResult::Image(text.to_string()))
}

fn image_url_in_text(message: &ChoiceMessage) -> Option<GenerationResult> {
    let text = message.text()?;
    IMAGE_URL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|url| GenerationResult::Image(url.as_str().to_string()))
}

fn claims_image_without_one(message: &ChoiceMessage) -> Option<GenerationResult> {
    let text = message.text()?;
    if CLAIMS_IMAGE.is_match(text) {
        Some(GenerationResult::Text(format!(
            "The model said it produced an image, but no image was returned. Raw response: {text}"
        )))
    } else {
        None
    }
}

fn plain_text(message: &ChoiceMessage) -> Option<GenerationResult> {
    message
        .text()
        .filter(|text| !text.trim().is_empty())
        .map(|text| GenerationResult::Text(text.to_string()))
}

/// Split a `data:<mime>;base64,<data>` URI into `(mime, data)`.
pub fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let caps = DATA_URI.captures(uri)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Guess an image MIME type from a URL's extension.
pub fn mime_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        Some("image/png")
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        Some("image/jpeg")
    } else if path.ends_with(".webp") {
        Some("image/webp")
    } else {
        None
    }
}

/// Gemini part carrying an image result, if the payload can be expressed as one.
pub fn image_part(payload: &str) -> Option<Part> {
    if let Some((mime_type, data)) = parse_data_uri(payload) {
        return Some(Part::inline(mime_type, data));
    }
    if payload.starts_with("http://") || payload.starts_with("https://") {
        return Some(Part::FileData {
            file_data: FileData {
                mime_type: mime_from_url(payload).map(str::to_string),
                file_uri: payload.to_string(),
            },
        });
    }
    None
}

/// Render a result as the parts of a single Gemini candidate.
pub fn result_parts(result: &GenerationResult) -> Vec<Part> {
    match result {
        GenerationResult::Image(payload) => match image_part(payload) {
            Some(part) => vec![Part::text(IMAGE_PLACEHOLDER), part],
            None => vec![Part::text(IMAGE_PARSE_FAILED)],
        },
        GenerationResult::Text(text) => vec![Part::text(text.as_str())],
    }
}

/// Single-document emitter: one complete `generateContent` response.
pub fn to_gemini_response(result: &GenerationResult) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content::model(result_parts(result)),
            finish_reason: Some(FINISH_REASON_STOP.to_string()),
            index: Some(0),
        }],
        usage_metadata: Some(UsageMetadata::SYNTHETIC),
    }
}
