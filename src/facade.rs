//! Session operations for application code.
//!
//! SYSTEM CONTEXT
//! ==============
//! Collaborators (route guards, UI shells, the CLI) call `initialize`,
//! `login`, `logout`, `register` and `get_current_user`, and read the
//! resulting `SessionState`. They never touch the coordinator or the
//! credential store directly.
//!
//! DESIGN
//! ======
//! One facade owns one `SessionState`, one `CredentialStore` and one
//! `RequestPipeline`. Nothing is global: two facades never share a session.
//! Operations update local state first and then propagate their error; only
//! `initialize` swallows failures. A rejected login leaves whatever session
//! already exists alone.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, watch};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::credentials::{AccessToken, CredentialStore};
use crate::error::SessionError;
use crate::pipeline::RequestPipeline;
use crate::state::{SessionSnapshot, SessionState, UserRecord};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Message used when the server rejects a login without saying why.
pub const DEFAULT_LOGIN_FAILURE: &str = "unable to sign in";

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Credentials posted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
}

impl LoginRequest {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), mfa_code: None }
    }

    #[must_use]
    pub fn with_mfa_code(mut self, code: impl Into<String>) -> Self {
        self.mfa_code = Some(code.into());
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"***")
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Body of a successful login. Fields other than `user` and `access_token`
/// are kept in `extra` and handed back untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<UserRecord>,
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct IdentityResponse {
    #[serde(default)]
    user: Option<UserRecord>,
}

// =============================================================================
// FACADE
// =============================================================================

pub struct SessionFacade {
    config: SessionConfig,
    session: SessionState,
    pipeline: RequestPipeline,
    init: OnceCell<()>,
}

impl SessionFacade {
    /// Facade over an injected transport.
    #[must_use]
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let session = SessionState::new();
        let pipeline = RequestPipeline::new(transport, &config, session.clone(), CredentialStore::default());
        Self { config, session, pipeline, init: OnceCell::new() }
    }

    /// Facade over a fresh [`HttpTransport`] for `config`.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the HTTP client cannot be constructed.
    pub fn from_config(config: SessionConfig) -> Result<Self, SessionError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Establish the initial session state once per facade.
    ///
    /// Public paths are marked initialized without probing the identity
    /// endpoint. Concurrent callers share one probe; later calls return
    /// immediately. Never fails.
    pub async fn initialize(&self, current_path: &str) {
        self.init
            .get_or_init(|| async {
                if self.pipeline.matcher().is_public(current_path) {
                    debug!(path = current_path, "public path; skipping session probe");
                } else if let Err(e) = self.get_current_user().await {
                    debug!(path = current_path, error = %e, "no active session");
                }
                self.session.mark_initialized();
            })
            .await;
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns `LoginFailure` carrying the server's message (or a generic
    /// one) when the credentials are rejected or the server is unreachable,
    /// and `Decode` if a success body cannot be parsed. A failed attempt
    /// never changes the session or the stored credential.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, SessionError> {
        let request = ApiRequest::post(self.config.endpoints.login.as_str())
            .with_json(serde_json::to_value(credentials)?);

        let response = match self.pipeline.send(request).await {
            Ok(response) => response,
            Err(e) => {
                let message = match e {
                    SessionError::Unauthorized { message, .. } => message,
                    other => {
                        warn!(error = %other, "login request failed");
                        None
                    }
                };
                return Err(login_failure(message));
            }
        };

        if !response.is_success() {
            return Err(login_failure(response.server_message()));
        }

        let body: LoginResponse = response.json()?;

        if let Some(token) = &body.access_token {
            self.pipeline.credentials().set(token.clone());
        }
        self.session.mark_authenticated(body.user.clone());
        info!(user = body.user.as_ref().and_then(UserRecord::id), "login succeeded");
        Ok(body)
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` (or `Unauthorized` for a 401) with the server's
    /// message, `Network` if the server is unreachable, or `Decode` for a
    /// non-JSON success body.
    pub async fn register(&self, user_data: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        let request = ApiRequest::post(self.config.endpoints.register.as_str()).with_json(user_data.clone());
        let response = self.pipeline.send(request).await?;
        if !response.is_success() {
            return Err(response.rejection());
        }
        if response.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        response.json()
    }

    /// End the session. Local state is cleared whatever the server says.
    ///
    /// # Errors
    ///
    /// Returns the network or server failure after local state is cleared.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let request = ApiRequest::post(self.config.endpoints.logout.as_str());
        let result = self.pipeline.send(request).await;
        self.clear_local();

        match result {
            Ok(response) if response.is_success() => {
                info!("logged out");
                Ok(())
            }
            Ok(response) => {
                let err = response.rejection();
                warn!(error = %err, "logout rejected by server; local session cleared");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "logout request failed; local session cleared");
                Err(err)
            }
        }
    }

    /// Fetch the identity of the current session.
    ///
    /// # Errors
    ///
    /// Any failure (including a body without `user`) clears the session and
    /// is returned.
    pub async fn get_current_user(&self) -> Result<UserRecord, SessionError> {
        match self.fetch_identity().await {
            Ok(user) => {
                self.session.set_user(user.clone());
                Ok(user)
            }
            Err(e) => {
                self.session.clear();
                Err(e)
            }
        }
    }

    async fn fetch_identity(&self) -> Result<UserRecord, SessionError> {
        let response = self
            .pipeline
            .send(ApiRequest::get(self.config.endpoints.me.as_str()))
            .await?;
        if !response.is_success() {
            return Err(response.rejection());
        }
        let body: IdentityResponse = response.json()?;
        body.user
            .ok_or_else(|| SessionError::Decode("identity response has no user".into()))
    }

    /// Send an arbitrary API call with credential attachment and refresh.
    ///
    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        self.pipeline.send(request).await
    }

    /// Seed the bearer credential, e.g. from a token persisted elsewhere.
    pub fn set_access_token(&self, token: AccessToken) {
        self.pipeline.credentials().set(token);
    }

    fn clear_local(&self) {
        self.session.clear();
        self.pipeline.credentials().clear();
    }

    // -------------------------------------------------------------------------
    // observers
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserRecord> {
        self.session.user()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session.is_initialized()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

fn login_failure(message: Option<String>) -> SessionError {
    SessionError::LoginFailure(message.unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_owned()))
}

#[cfg(test)]
#[path = "facade_test.rs"]
mod tests;
