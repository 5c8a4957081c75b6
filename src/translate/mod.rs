//! Translation between the Gemini envelope and OpenRouter chat completions.
//!
//! Requests go Gemini → OpenRouter, results come back OpenRouter → Gemini, either as
//! one document or as a paced event stream. All translation functions are pure (no I/O).

pub mod gemini_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
