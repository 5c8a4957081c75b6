//! Error types for the proxy.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("API key is missing.")]
    MissingCredential,

    #[error("{message}")]
    MalformedInput { message: String },

    #[error("No user message found.")]
    MissingUserTurn,

    #[error("OpenRouter API error (status {status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Quota denied: {reason}")]
    QuotaDenied { reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn quota_denied(reason: impl Into<String>) -> Self {
        Self::QuotaDenied {
            reason: reason.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// HTTP status used when this error is returned before a stream has started.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::MalformedInput { .. } | Self::MissingUserTurn => StatusCode::BAD_REQUEST,
            Self::QuotaDenied { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
