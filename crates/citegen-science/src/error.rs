use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, gave up after {1} retries")]
    RateLimit(String, u32),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] citegen_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ScienceError>;
