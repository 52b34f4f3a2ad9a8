//! Request/response descriptors and the HTTP transport seam.
//!
//! DESIGN
//! ======
//! `ApiRequest` is a plain, cloneable description of a call (method, path,
//! headers, JSON body) so a failed request can be snapshotted and replayed
//! after a refresh. `Transport` is the only thing that touches the network;
//! `HttpTransport` implements it with `reqwest`, tests substitute scripted
//! mocks.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::SessionConfig;
use crate::credentials::AccessToken;
use crate::error::SessionError;

// =============================================================================
// REQUEST
// =============================================================================

/// Everything needed to send, or re-send, one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/api/auth/me`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeader` if the token contains bytes not allowed in a header.
    pub fn with_bearer(&self, token: &AccessToken) -> Result<Self, SessionError> {
        let mut value = HeaderValue::from_str(&token.bearer())?;
        value.set_sensitive(true);
        Ok(self.clone().with_header(AUTHORIZATION, value))
    }

    /// The bearer token attached to this request, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A received response. The body is kept as text and parsed on demand.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    #[must_use]
    pub fn from_json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Human-readable error message supplied by the server, if any.
    ///
    /// Looks at `detail` (string, or a list of `{ "msg": ... }` validation
    /// entries), then `message`, then `error`.
    #[must_use]
    pub fn server_message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let message = match value.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|i| i.get("msg").and_then(serde_json::Value::as_str))
                    .collect();
                (!msgs.is_empty()).then(|| msgs.join("; "))
            }
            _ => None,
        }
        .or_else(|| value.get("message").and_then(serde_json::Value::as_str).map(str::to_owned))
        .or_else(|| value.get("error").and_then(serde_json::Value::as_str).map(str::to_owned))?;

        let message = message.trim();
        (!message.is_empty()).then(|| message.to_owned())
    }

    /// Map a non-success response to the matching error variant.
    #[must_use]
    pub fn rejection(&self) -> SessionError {
        if self.is_unauthorized() {
            return SessionError::Unauthorized { status: self.status, message: self.server_message() };
        }
        SessionError::Rejected {
            status: self.status,
            message: self
                .server_message()
                .unwrap_or_else(|| format!("HTTP {}", self.status)),
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Sends one request and returns whatever the server answered.
///
/// Non-success statuses are responses, not errors. Only failures to obtain a
/// response at all are `Err`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError>;
}

/// `reqwest`-backed transport with a cookie store for ambient session cookies.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the TLS backend cannot be initialized.
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        Self::with_default_headers(config, HeaderMap::new())
    }

    /// Like [`HttpTransport::new`], sending `headers` with every request
    /// (e.g. a pre-existing `Cookie`).
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the TLS backend cannot be initialized.
    pub fn with_default_headers(config: &SessionConfig, headers: HeaderMap) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .map_err(|e| SessionError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(method = %request.method, path = %request.path, status, "api response");
        Ok(ApiResponse { status, headers, body })
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
