//! Provider errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key not configured for provider '{0}'")]
    MissingApiKey(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
