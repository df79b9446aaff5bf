use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OllamaApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid request payload: {0}")]
    InvalidRequestPayload(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} {message}")]
    Status { status: StatusCode, message: String },

    #[error("stream failed: {message}")]
    StreamFailed { message: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl OllamaApiError {
    /// Returns true for the internal cancellation outcome.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true when the failure came from the connection or the server
    /// rather than from local configuration.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Status { .. } | Self::StreamFailed { .. }
        )
    }
}

/// Extracts a human-readable message from a non-success response body.
///
/// The server reports failures as `{"error": "..."}`; proxies in front of it
/// sometimes use `{"error": {"message": "..."}}`. Anything else falls back to
/// the raw body, then to the canonical status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = match value.get("error") {
            Some(Value::String(message)) => Some(message.as_str()),
            Some(Value::Object(fields)) => fields.get("message").and_then(Value::as_str),
            _ => None,
        };

        if let Some(message) = message.map(str::trim).filter(|message| !message.is_empty()) {
            return message.to_string();
        }
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_not_a_transport_failure() {
        assert!(OllamaApiError::Cancelled.is_cancelled());
        assert!(!OllamaApiError::Cancelled.is_transport());
        assert!(OllamaApiError::StreamFailed {
            message: "boom".to_string()
        }
        .is_transport());
    }

    #[test]
    fn status_error_display_includes_code_and_message() {
        let error = OllamaApiError::Status {
            status: StatusCode::NOT_FOUND,
            message: "model 'nope' not found".to_string(),
        };

        assert_eq!(error.to_string(), "HTTP 404 Not Found model 'nope' not found");
    }
}
