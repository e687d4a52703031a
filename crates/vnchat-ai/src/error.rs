//! Error types for vnchat-ai

use thiserror::Error;

/// Result type alias using vnchat-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a local generation server
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// The response stream broke off or could not be decoded
    #[error("Stream error: {0}")]
    Stream(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Model is not installed on the server
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::Stream(_) => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || et.starts_with("http_5")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
                    || msg.contains("server busy")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_stream_error() {
        assert!(Error::Stream("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_retryable_api_overloaded_error_type() {
        let e = Error::api("overloaded_error", "The server is overloaded");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_retryable_api_server_status() {
        let e = Error::api("http_503", "Service Unavailable");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_retryable_api_too_many_requests() {
        let e = Error::api("error", "Too many requests");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_not_retryable_api_bad_request() {
        let e = Error::api("http_400", "invalid options");
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_not_retryable_non_api() {
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(!Error::ModelNotFound("llama3".into()).is_retryable());
        assert!(!Error::InvalidConfig("empty base url".into()).is_retryable());
    }
}
