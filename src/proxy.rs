use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::quota;
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::translate::response::{classify_response, GenerationResult};

/// Send one chat-completions request to the provider and classify the answer.
///
/// Exactly one request is made; there are no retries.
pub async fn call_upstream(
    messages: Vec<ChatMessage>,
    api_key: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<GenerationResult> {
    if api_key.is_empty() {
        return Err(ProxyError::MissingCredential);
    }

    let url = config.chat_completions_url();
    let request = ChatCompletionRequest {
        model: config.upstream.model.clone(),
        messages,
        temperature: Some(config.upstream.temperature),
        max_tokens: Some(config.upstream.max_tokens),
        seed: Some(rand::random()),
    };

    tracing::info!(
        url = %url,
        model = %request.model,
        messages = request.messages.len(),
        "POST chat completions"
    );

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;

    tracing::debug!(status, body_len = body.len(), "Provider response");

    if status >= 400 {
        tracing::warn!(status, body = truncate(&body, 300), "Provider rejected request");
        return Err(ProxyError::UpstreamRejected { status, body });
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
        ProxyError::other(format!(
            "Failed to parse provider response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    let result = classify_response(&parsed);
    tracing::info!(kind = result.kind(), "Generation completed");
    Ok(result)
}

/// Run the quota guard (when enabled) and then the upstream call.
pub async fn guarded_generate(
    messages: Vec<ChatMessage>,
    api_key: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<GenerationResult> {
    ensure_quota(api_key, config, client).await?;
    call_upstream(messages, api_key, config, client).await
}

/// Fail with `QuotaDenied` unless the guard is disabled or allows the configured model.
pub async fn ensure_quota(
    api_key: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<()> {
    if !config.quota.enabled {
        return Ok(());
    }
    if api_key.is_empty() {
        return Err(ProxyError::MissingCredential);
    }
    quota::check(api_key, &config.upstream.model, config, client)
        .await
        .into_result()
        .map(|_| ())
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("生成图像", 4), "生");
    }

    #[tokio::test]
    async fn test_empty_key_fails_before_network() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "http://127.0.0.1:1/api/v1".to_string();
        let client = reqwest::Client::new();

        let err = call_upstream(Vec::new(), "", &config, &client).await.unwrap_err();
        assert!(matches!(err, ProxyError::MissingCredential));
    }

    #[tokio::test]
    async fn test_disabled_guard_skips_account_query() {
        let mut config = ProxyConfig::default();
        config.quota.enabled = false;
        config.upstream.base_url = "http://127.0.0.1:1/api/v1".to_string();
        let client = reqwest::Client::new();

        assert!(ensure_quota("sk-or-test", &config, &client).await.is_ok());
    }
}
