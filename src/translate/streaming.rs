//! Re-stream a finished generation as Gemini `streamGenerateContent` chunks.
//!
//! The provider call is not streamed; once it completes, text is replayed one code
//! point per chunk with a short pause in between, and an image is sent as a final
//! inline-data chunk after a streamed placeholder phrase.

use std::future::Future;
use std::time::Duration;

use futures::stream::Stream;

use super::gemini_types::{
    Candidate, Content, GenerateContentResponse, Part, StreamErrorChunk, UsageMetadata,
};
use super::response::{image_part, GenerationResult, FINISH_REASON_STOP, IMAGE_PLACEHOLDER};
use crate::error::Result;

/// One SSE `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Incremental content. `paced` frames are followed by the per-character pause.
    Chunk {
        body: GenerateContentResponse,
        paced: bool,
    },
    /// Terminal error; nothing follows it.
    Error(StreamErrorChunk),
    /// The literal `[DONE]` sentinel.
    Done,
}

impl StreamFrame {
    pub fn data(&self) -> String {
        match self {
            StreamFrame::Chunk { body, .. } => serde_json::to_string(body).unwrap_or_default(),
            StreamFrame::Error(err) => serde_json::to_string(err).unwrap_or_default(),
            StreamFrame::Done => "[DONE]".to_string(),
        }
    }
}

fn content_chunk(parts: Vec<Part>) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content::model(parts),
            finish_reason: None,
            index: None,
        }],
        usage_metadata: None,
    }
}

fn stop_chunk() -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content::model(Vec::new()),
            finish_reason: Some(FINISH_REASON_STOP.to_string()),
            index: None,
        }],
        usage_metadata: Some(UsageMetadata::SYNTHETIC),
    }
}

/// Every frame a successful result produces, in order.
pub fn frames_for(result: &GenerationResult) -> Vec<StreamFrame> {
    let text = match result {
        GenerationResult::Image(_) => IMAGE_PLACEHOLDER,
        GenerationResult::Text(text) => text.as_str(),
    };

    let mut frames: Vec<StreamFrame> = text
        .chars()
        .map(|c| StreamFrame::Chunk {
            body: content_chunk(vec![Part::text(c.to_string())]),
            paced: true,
        })
        .collect();

    if let GenerationResult::Image(payload) = result {
        match image_part(payload) {
            Some(part) => frames.push(StreamFrame::Chunk {
                body: content_chunk(vec![part]),
                paced: false,
            }),
            None => tracing::warn!("Image result could not be converted to a Gemini part"),
        }
    }

    frames.push(StreamFrame::Chunk {
        body: stop_chunk(),
        paced: false,
    });
    frames.push(StreamFrame::Done);
    frames
}

/// Await the upstream call, then emit its frames with `pause` after each paced chunk.
/// A failed call yields a single error frame and ends the stream.
pub fn generation_stream<F>(upstream: F, pause: Duration) -> impl Stream<Item = StreamFrame> + Send
where
    F: Future<Output = Result<GenerationResult>> + Send + 'static,
{
    async_stream::stream! {
        match upstream.await {
            Ok(result) => {
                let frames = frames_for(&result);
                let count = frames.len();
                for frame in frames {
                    let paced = matches!(frame, StreamFrame::Chunk { paced: true, .. });
                    yield frame;
                    if paced && !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                tracing::info!(kind = result.kind(), frames = count, "Stream completed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Error inside stream");
                yield StreamFrame::Error(StreamErrorChunk::internal(e.to_string()));
            }
        }
    }
}
