//! Translate Gemini conversations into OpenRouter chat messages.
//!
//! Only the trailing "relevant window" of the history is forwarded: the last user
//! turn, preceded by the most recent model turn before it (if any). Older turns are
//! dropped so a stateless image model never has to replay a long history.

use super::gemini_types::{Content, GenerateContentRequest, Part, Role};
use super::openai_types::{ChatMessage, ChatRole, ContentPart};
use crate::error::{ProxyError, Result};

/// Slice of `turns` that is forwarded upstream.
///
/// Ends at the last `user` turn (inclusive) and starts at the closest `model` turn
/// before it, or at the user turn itself when no earlier model turn exists.
pub fn relevant_window(turns: &[Content]) -> Result<&[Content]> {
    let last_user = turns
        .iter()
        .rposition(|turn| turn.role == Role::User)
        .ok_or(ProxyError::MissingUserTurn)?;

    let start = turns[..last_user]
        .iter()
        .rposition(|turn| turn.role == Role::Model)
        .unwrap_or(last_user);

    Ok(&turns[start..=last_user])
}

/// Normalize a full Gemini turn history into provider messages.
pub fn normalize_history(turns: &[Content]) -> Result<Vec<ChatMessage>> {
    Ok(relevant_window(turns)?.iter().map(translate_turn).collect())
}

/// Translate a complete Gemini request: optional system instruction, then the
/// relevant window of `contents`.
pub fn gemini_to_openai(req: &GenerateContentRequest) -> Result<Vec<ChatMessage>> {
    if req.contents.is_empty() {
        return Err(ProxyError::malformed(
            "Invalid request: 'contents' array is missing.",
        ));
    }

    let mut messages = Vec::new();

    if let Some(ref system) = req.system_instruction {
        let text = system
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            messages.push(ChatMessage {
                role: ChatRole::System,
                content: vec![ContentPart::text(text)],
            });
        }
    }

    messages.append(&mut normalize_history(&req.contents)?);
    Ok(messages)
}

/// Messages for the dedicated endpoint: one user turn holding the prompt followed by
/// each image as given (data URI or URL).
pub fn prompt_to_openai(prompt: &str, images: &[String]) -> Result<Vec<ChatMessage>> {
    if prompt.trim().is_empty() {
        return Err(ProxyError::malformed("Prompt is required."));
    }

    let mut content = Vec::with_capacity(images.len() + 1);
    content.push(ContentPart::text(prompt));
    content.extend(
        images
            .iter()
            .filter(|img| !img.is_empty())
            .map(|img| ContentPart::image(img.as_str())),
    );

    Ok(vec![ChatMessage {
        role: ChatRole::User,
        content,
    }])
}

fn translate_turn(turn: &Content) -> ChatMessage {
    let role = match turn.role {
        Role::User => ChatRole::User,
        Role::Model => ChatRole::Assistant,
    };

    ChatMessage {
        role,
        content: turn.parts.iter().map(translate_part).collect(),
    }
}

fn translate_part(part: &Part) -> ContentPart {
    match part {
        Part::Text { text } => ContentPart::text(text.as_str()),
        Part::InlineData { inline_data } => {
            ContentPart::image(to_data_uri(&inline_data.mime_type, &inline_data.data))
        }
        Part::FileData { file_data } => ContentPart::image(file_data.file_uri.as_str()),
    }
}

pub fn to_data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}
