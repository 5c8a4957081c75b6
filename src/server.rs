use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::proxy;
use crate::quota::{self, QuotaReport};
use crate::translate::gemini_types::{ErrorResponse, GenerateContentRequest};
use crate::translate::openai_types::ChatMessage;
use crate::translate::request::{gemini_to_openai, prompt_to_openai};
use crate::translate::response::{to_gemini_response, GenerationResult};
use crate::translate::streaming::generation_stream;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);

    Router::new()
        .route("/v1beta/models/:target", post(handle_model_action))
        .route("/v1/models/:target", post(handle_model_action))
        .route("/generate", post(handle_generate))
        .route("/quota", get(handle_quota))
        .route("/health", get(handle_health))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of the dedicated `/generate` endpoint.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub apikey: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    pub model: Option<String>,
}

/// Credential for the Gemini-emulation endpoints: `Authorization: Bearer <key>`,
/// then `x-goog-api-key`.
pub fn resolve_api_key(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty());

    let goog = || {
        headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    bearer.or_else(goog).map(str::to_string)
}

fn error_response(err: &ProxyError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::warn!(error = %err, status = status.as_u16(), "Request rejected");
    }
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Dispatch `{model}:generateContent` and `{model}:streamGenerateContent`.
async fn handle_model_action(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (model, action) = target.rsplit_once(':').unwrap_or((target.as_str(), ""));

    let span = tracing::info_span!(
        "generate",
        request_id = %uuid::Uuid::new_v4(),
        model = %model,
        action = %action
    );

    match action {
        "generateContent" => handle_standard(state, &headers, &body).instrument(span).await,
        "streamGenerateContent" => handle_streaming(state, &headers, &body, span).await,
        _ => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Unsupported model action '{target}'"))),
        )
            .into_response(),
    }
}

/// Credential check, body parse and normalization shared by both emulation endpoints.
fn prepare(headers: &HeaderMap, body: &[u8]) -> Result<(String, Vec<ChatMessage>)> {
    let api_key = resolve_api_key(headers).ok_or(ProxyError::MissingCredential)?;

    let req: GenerateContentRequest = serde_json::from_slice(body)
        .map_err(|e| ProxyError::malformed(format!("Invalid request body: {e}")))?;

    tracing::info!(contents = req.contents.len(), "Gemini request");

    let messages = gemini_to_openai(&req)?;
    Ok((api_key, messages))
}

async fn handle_standard(state: Arc<AppState>, headers: &HeaderMap, body: &[u8]) -> Response {
    let (api_key, messages) = match prepare(headers, body) {
        Ok(prepared) => prepared,
        Err(e) => return error_response(&e),
    };

    match proxy::guarded_generate(messages, &api_key, &state.config, &state.client).await {
        Ok(result) => Json(to_gemini_response(&result)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_streaming(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
    span: tracing::Span,
) -> Response {
    let (api_key, messages) = match span.in_scope(|| prepare(headers, body)) {
        Ok(prepared) => prepared,
        Err(e) => return error_response(&e),
    };

    // Quota denial still gets a proper status code, so it runs before the stream opens.
    if let Err(e) = proxy::ensure_quota(&api_key, &state.config, &state.client)
        .instrument(span.clone())
        .await
    {
        return error_response(&e);
    }

    let pause = state.config.char_delay();
    let upstream = async move {
        proxy::call_upstream(messages, &api_key, &state.config, &state.client).await
    }
    .instrument(span);

    let event_stream = generation_stream(upstream, pause).map(
        |frame| -> std::result::Result<Event, Infallible> {
            Ok(Event::default().data(frame.data()))
        },
    );

    Sse::new(event_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_generate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let span = tracing::info_span!("generate", request_id = %uuid::Uuid::new_v4(), action = "prompt");

    async move {
        let req: PromptRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return error_response(&ProxyError::malformed(format!("Invalid request body: {e}")))
            }
        };

        let api_key = match req
            .apikey
            .filter(|k| !k.trim().is_empty())
            .or_else(|| state.config.fallback_api_key())
        {
            Some(key) => key,
            None => return error_response(&ProxyError::MissingCredential),
        };

        let messages = match prompt_to_openai(&req.prompt, &req.images) {
            Ok(m) => m,
            Err(e) => return error_response(&e),
        };

        tracing::info!(images = req.images.len(), "Prompt request");

        match proxy::guarded_generate(messages, &api_key, &state.config, &state.client).await {
            Ok(GenerationResult::Image(url)) => {
                Json(serde_json::json!({ "imageUrl": url })).into_response()
            }
            Ok(GenerationResult::Text(text)) => error_response(&ProxyError::other(format!(
                "Model returned text instead of an image: {text}"
            ))),
            Err(e) => error_response(&e),
        }
    }
    .instrument(span)
    .await
}

async fn handle_quota(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuotaQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(api_key) = resolve_api_key(&headers).or_else(|| state.config.fallback_api_key())
    else {
        return error_response(&ProxyError::MissingCredential);
    };

    let model = query
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.upstream.model.clone());

    let decision = quota::check(&api_key, &model, &state.config, &state.client).await;
    Json(QuotaReport::new(decision, model)).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
