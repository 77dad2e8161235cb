//! Client-side error taxonomy.
//!
//! DESIGN
//! ======
//! Every backend interaction reports a `ClientError`. The UI never needs the
//! underlying transport error, only which of three recovery paths applies:
//! connectivity (banner, retry on next user action), not-found (terminal for
//! this load, explicit "start new session") or per-message (localized to one
//! entry, transcript unaffected). Payloads are strings so errors can travel
//! through the event queue by value.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

/// How the UI recovers from an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Backend unreachable; shown as a persistent banner.
    Connectivity,
    /// Chatbot or session missing, inactive or owned by another chatbot.
    NotFound,
    /// A single send or feedback call failed.
    PerMessage,
}

/// Errors produced by backend operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The request never reached the backend (DNS, refused, timeout).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered 404 for the named resource.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The backend answered with another non-success status.
    #[error("backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The response body did not match the expected schema.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// A URL could not be built or parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ClientError {
    /// Recovery class for this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unreachable(_) | Self::HttpClientBuild(_) => ErrorClass::Connectivity,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Status { status: 502..=504, .. } => ErrorClass::Connectivity,
            Self::Status { .. } | Self::Parse(_) | Self::InvalidUrl(_) => ErrorClass::PerMessage,
        }
    }

    /// Stable machine-readable code for logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "E_UNREACHABLE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Status { .. } => "E_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Status { status: 429 | 500..=599, .. }
        )
    }

    /// Text suitable for the widget status line, e.g. `Error: Chatbot not found`.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { detail, .. } if !detail.is_empty() => detail.clone(),
            other => other.to_string(),
        }
    }
}
