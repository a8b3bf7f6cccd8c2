use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Message shown for every transport-level failure, whatever the cause.
pub const UNREACHABLE_MESSAGE: &str =
    "Cannot reach the server. Check your connection and that the API is running.";

/// Errors surfaced to callers of the API client, services and query handles.
///
/// `Clone` because a single outcome is handed to every waiter of a
/// deduplicated request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{}", UNREACHABLE_MESSAGE)]
    Unreachable { cause: NetworkCause },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("{0}")]
    Validation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Underlying reason a request never received an HTTP response.
///
/// Kept for logging only; it never changes the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkCause {
    Timeout,
    Dns,
    ConnectionRefused,
    Other,
}

impl fmt::Display for NetworkCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkCause::Timeout => write!(f, "timeout"),
            NetworkCause::Dns => write!(f, "dns"),
            NetworkCause::ConnectionRefused => write!(f, "connection refused"),
            NetworkCause::Other => write!(f, "transport"),
        }
    }
}

impl NetworkCause {
    /// Classify a transport error by walking its source chain.
    pub fn classify(err: &reqwest::Error) -> Self {
        Self::from_parts(err.is_timeout(), err.is_connect(), &error_chain(err))
    }

    fn from_parts(is_timeout: bool, is_connect: bool, chain: &str) -> Self {
        let chain = chain.to_lowercase();
        if is_timeout || chain.contains("timed out") {
            NetworkCause::Timeout
        } else if chain.contains("dns error")
            || chain.contains("failed to lookup address")
            || chain.contains("name or service not known")
            || chain.contains("no such host")
        {
            NetworkCause::Dns
        } else if is_connect || chain.contains("connection refused") {
            NetworkCause::ConnectionRefused
        } else {
            NetworkCause::Other
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Keys checked, in order, for a human-readable message in a JSON error body.
const MESSAGE_KEYS: [&str; 3] = ["detail", "message", "error"];

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the backend's message out of an error body.
    ///
    /// Understands `{"detail": ..}`-style bodies, `non_field_errors` and
    /// per-field error maps (`{"phone": ["Invalid number."]}`). Anything else
    /// is passed through as (truncated) text.
    pub fn extract_message(body: &str) -> String {
        let trimmed = body.trim();
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => return Self::truncate_body(trimmed),
        };

        match parsed {
            Value::Object(map) => {
                for key in MESSAGE_KEYS {
                    if let Some(message) = map.get(key).and_then(flatten_messages) {
                        return message;
                    }
                }
                if let Some(message) = map.get("non_field_errors").and_then(flatten_messages) {
                    return message;
                }
                let fields: Vec<String> = map
                    .iter()
                    .filter_map(|(field, value)| {
                        flatten_messages(value).map(|message| format!("{}: {}", field, message))
                    })
                    .collect();
                if fields.is_empty() {
                    Self::truncate_body(trimmed)
                } else {
                    fields.join("; ")
                }
            }
            other => flatten_messages(&other).unwrap_or_else(|| Self::truncate_body(trimmed)),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let mut message = Self::extract_message(body);
        if message.is_empty() {
            message = status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string();
        }
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            400..=499 => ApiError::Validation(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Map a reqwest failure that happened before any response arrived.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Unreachable {
                cause: NetworkCause::classify(&err),
            }
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Unreachable { .. })
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

fn flatten_messages(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_messages).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_unreachable_message_is_uniform() {
        let messages: Vec<String> = [
            NetworkCause::Timeout,
            NetworkCause::Dns,
            NetworkCause::ConnectionRefused,
            NetworkCause::Other,
        ]
        .into_iter()
        .map(|cause| ApiError::Unreachable { cause }.to_string())
        .collect();

        assert!(messages.iter().all(|m| m == UNREACHABLE_MESSAGE));
    }

    #[test]
    fn test_classify_causes() {
        assert_eq!(
            NetworkCause::from_parts(true, false, "operation timed out"),
            NetworkCause::Timeout
        );
        assert_eq!(
            NetworkCause::from_parts(
                false,
                true,
                "error sending request: client error (Connect): dns error: failed to lookup address information"
            ),
            NetworkCause::Dns
        );
        assert_eq!(
            NetworkCause::from_parts(false, true, "tcp connect error: Connection refused (os error 111)"),
            NetworkCause::ConnectionRefused
        );
        assert_eq!(NetworkCause::from_parts(false, false, "connection reset"), NetworkCause::Other);
    }

    #[test]
    fn test_extract_message_detail() {
        assert_eq!(
            ApiError::extract_message(r#"{"detail": "Member is already checked in."}"#),
            "Member is already checked in."
        );
        assert_eq!(
            ApiError::extract_message(r#"{"non_field_errors": ["Plan has expired."]}"#),
            "Plan has expired."
        );
    }

    #[test]
    fn test_extract_message_field_errors() {
        let body = r#"{"amount": ["Ensure this value is greater than 0."], "phone_number": ["Invalid number."]}"#;
        assert_eq!(
            ApiError::extract_message(body),
            "amount: Ensure this value is greater than 0.; phone_number: Invalid number."
        );
    }

    #[test]
    fn test_extract_message_plain_and_long() {
        assert_eq!(ApiError::extract_message("Bad Gateway"), "Bad Gateway");

        let long = "x".repeat(800);
        let message = ApiError::extract_message(&long);
        assert!(message.starts_with(&"x".repeat(500)));
        assert!(message.contains("800 total bytes"));
    }

    #[test]
    fn test_from_status() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail": "Phone already registered"}"#);
        assert_eq!(err, ApiError::Validation("Phone already registered".to_string()));
        assert_eq!(err.to_string(), "Phone already registered");

        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail": "No active account"}"#),
            ApiError::Unauthorized(_)
        ));
        assert_eq!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited);
        assert_eq!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::ServerError("Internal Server Error".to_string())
        );
    }
}
