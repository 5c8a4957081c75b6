use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body. Inline images arrive base64-encoded in the body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the fallback credential used by the
    /// dedicated `/generate` endpoint and the quota report.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Substring of a model id that marks it as free-tier.
    #[serde(default = "default_free_tier_marker")]
    pub free_tier_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_char_delay_ms")]
    pub char_delay_ms: u64,
}

fn default_port() -> u16 {
    3008
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_model() -> String {
    "google/gemini-2.5-flash-image-preview:free".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u64 {
    4096
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_free_tier_marker() -> String {
    ":free".to_string()
}

fn default_char_delay_ms() -> u64 {
    2
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            upstream: UpstreamConfig::default(),
            quota: QuotaConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            free_tier_marker: default_free_tier_marker(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            char_delay_ms: default_char_delay_ms(),
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Server-side credential from the configured environment variable, if set.
    pub fn fallback_api_key(&self) -> Option<String> {
        std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.upstream.base_url.trim_end_matches('/'))
    }

    pub fn key_info_url(&self) -> String {
        format!("{}/key", self.upstream.base_url.trim_end_matches('/'))
    }

    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.stream.char_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("nanobanana-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("nanobanana-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("nanobanana-proxy").join("config.toml"));
        }
        if let Some(home) = dirs_path() {
            paths.push(home.join(".config").join("nanobanana-proxy").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".nanobanana-proxy.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
