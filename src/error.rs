//! Session error taxonomy.
//!
//! DESIGN
//! ======
//! `SessionError` is `Clone` because a single refresh failure is delivered to
//! every caller queued behind it. Transport and decode errors are flattened
//! to strings at the boundary for the same reason.

/// Grepable error code and retry hint for errors surfaced to collaborators.
pub trait ErrorCode {
    /// Stable machine-readable code, e.g. `E_REFRESH_FAILED`.
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later could succeed.
    fn retryable(&self) -> bool {
        false
    }
}

/// Errors produced by session operations and the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The API answered 401 and no refresh was attempted or allowed.
    #[error("unauthorized (status {status}): {}", .message.as_deref().unwrap_or("no detail"))]
    Unauthorized { status: u16, message: Option<String> },

    /// The refresh endpoint failed; the session is no longer authenticated.
    #[error("token refresh failed: {0}")]
    RefreshFailure(String),

    /// The login endpoint rejected the credentials.
    #[error("login failed: {0}")]
    LoginFailure(String),

    /// No response was received (connect error, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-success status surfaced by a session operation.
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl SessionError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::RefreshFailure(_) => "E_REFRESH_FAILED",
            Self::LoginFailure(_) => "E_LOGIN_FAILED",
            Self::Network(_) => "E_NETWORK",
            Self::Rejected { .. } => "E_REJECTED",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidHeader(_) => "E_INVALID_HEADER",
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Rejected { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for SessionError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
