//! Error handling for the chatbot admin client

use std::fmt;
use thiserror::Error;

/// Unified error type for the chatbot admin client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Local file errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No admin token was stored and none could be acquired; nothing was sent
    #[error("no admin token set")]
    MissingToken,

    /// The backend answered with a non-success status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Every candidate route for an operation failed
    #[error("{operation} failed: no endpoint answered successfully ({attempts} tried)")]
    AllCandidatesFailed { operation: String, attempts: usize },

    /// Input rejected locally before any request was made
    #[error("Invalid input: {0}")]
    Validation(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Create an API error from a status and a response body.
    ///
    /// The backend reports failures as `{"error": "..."}`; anything else is
    /// summarized by its status code.
    pub fn api(status: u16, body: &serde_json::Value) -> Self {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));
        Error::Api { status, message }
    }

    /// Whether the backend rejected the admin token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Api { status: 401, .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_prefers_body_message() {
        let err = Error::api(400, &json!({ "error": "plan invalid" }));
        assert_eq!(err.to_string(), "API error (HTTP 400): plan invalid");
    }

    #[test]
    fn test_api_error_falls_back_to_status() {
        let err = Error::api(401, &json!({}));
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "API error (HTTP 401): HTTP 401");
    }
}
