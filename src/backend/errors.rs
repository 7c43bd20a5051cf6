//! Backend error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries and user-facing chat messages.

use thiserror::Error;

/// Errors that can occur while talking to the report backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// TCP/HTTP connection to the backend failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The backend did not accept the connection in time.
    #[error("connection to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("could not decode response from {endpoint}: {reason}")]
    DecodeError { endpoint: String, reason: String },

    /// The backend answered 2xx but reported `success: false`.
    #[error("{endpoint} reported failure: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl BackendError {
    /// Whether the backend answered 404.
    ///
    /// The tax-sync endpoint answers 404 on deployments that do not have it
    /// yet; callers treat that as "feature absent", not as a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::HttpError { status: 404, .. })
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            BackendError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Typed error code carried in a JSON error body (`error_code` or `code`).
    ///
    /// The upload endpoints report validation failures this way, e.g.
    /// `{"error_code": "YEAR_MISMATCH", "message": "..."}`. FastAPI-style
    /// bodies nest the payload under `detail`.
    pub fn error_code(&self) -> Option<String> {
        let body = self.error_body()?;
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        let lookup = |v: &serde_json::Value| {
            v.get("error_code")
                .or_else(|| v.get("code"))
                .and_then(|c| c.as_str())
                .map(String::from)
        };
        lookup(&json).or_else(|| json.get("detail").and_then(lookup))
    }
}
