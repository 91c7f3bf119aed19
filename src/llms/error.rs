use thiserror::Error;

/// Typed error for backend and query operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend needs a key and none is configured
    #[error("{backend} needs an API key")]
    NoCredentials { backend: String },
    /// Provider rejected the configured key
    #[error("{backend} rejected the API key")]
    AuthenticationFailed { backend: String },
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
    /// `reply()` read before the query finished
    #[error("Query has not finished")]
    NotFinished,
    #[error("{backend} has no models available")]
    NoModels { backend: String },
    /// `run()` called on a query whose stream was already taken
    #[error("Query stream was already consumed")]
    StreamConsumed,
    /// Network-level failure (DNS, connection, timeout)
    #[error("Network error: {0}")]
    Network(String),
    /// API returned a non-success HTTP status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    /// Error object embedded in an otherwise successful stream
    #[error("Provider error: {0}")]
    Provider(String),
    /// Error reading from the response stream
    #[error("Stream read error: {0}")]
    StreamRead(String),
    /// Failed to parse response JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e.to_string())
    }
}
