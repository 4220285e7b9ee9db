/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Upstream error: [{code}] {message}")]
    Upstream { code: String, message: String },
    #[error("Source error: source={source_id}, message={message}")]
    Source { source_id: String, message: String },
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to turn one framed data line into a record.
///
/// Decode failures are scoped to a single record; the stream keeps going.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON in data line (event={event:?}): {source}")]
    MalformedJson {
        event: Option<String>,
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Broad error category, used to pick log severity and for callers that
/// want to react to classes of upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream error code string to an error category.
#[must_use]
pub fn category_from_upstream_code(code: &str) -> ErrorCategory {
    match code {
        "rate_limited" | "rate_limit_exceeded" | "too_many_requests" | "insufficient_quota" => {
            ErrorCategory::RateLimit
        }
        "invalid_api_key" | "unauthorized" | "authentication_error" => {
            ErrorCategory::Authentication
        }
        "forbidden" | "permission_denied" | "permission_error" => ErrorCategory::Permission,
        "invalid_request" | "invalid_request_error" | "context_length_exceeded" => {
            ErrorCategory::InvalidRequest
        }
        "server_error" | "internal_error" | "overloaded" | "overloaded_error" => {
            ErrorCategory::ServerError
        }
        _ => ErrorCategory::Unknown,
    }
}

impl CanonicalError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            CanonicalError::InvalidRecord(_) => ErrorCategory::InvalidRequest,
            CanonicalError::Config(_)
            | CanonicalError::Source { .. }
            | CanonicalError::Translation(_)
            | CanonicalError::Internal(_) => ErrorCategory::ServerError,
            CanonicalError::Upstream { code, .. } => category_from_upstream_code(code),
        }
    }
}
