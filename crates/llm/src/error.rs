use thiserror::Error;

/// Errors raised while asking a backend for generated files.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation backend not configured: {0}")]
    NotConfigured(String),

    #[error("LLM API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("LLM rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM returned no completion")]
    EmptyCompletion,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GenerationResult<T> = Result<T, GenerationError>;
