//! Outbound request pipeline.
//!
//! ARCHITECTURE
//! ============
//! Wraps an injected `Transport` instead of configuring a shared HTTP client.
//! Each call: read the refresh generation, attach the stored bearer token,
//! send. A 401 from a public path fails immediately; a 401 from a protected
//! path goes to the `RefreshCoordinator` and, if a renewed credential comes
//! back, is replayed exactly once.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::coordinator::RefreshCoordinator;
use crate::credentials::{AccessToken, CredentialStore};
use crate::error::SessionError;
use crate::paths::PublicPathMatcher;
use crate::state::SessionState;
use crate::transport::{ApiRequest, ApiResponse, Transport};

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: AccessToken,
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    matcher: PublicPathMatcher,
    refresh_path: String,
    credentials: CredentialStore,
    coordinator: RefreshCoordinator,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
        session: SessionState,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            transport,
            matcher: config.matcher(),
            refresh_path: config.endpoints.refresh.clone(),
            coordinator: RefreshCoordinator::new(session, credentials.clone()),
            credentials,
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn matcher(&self) -> &PublicPathMatcher {
        &self.matcher
    }

    /// Send `request` with the current credential, recovering from an
    /// expired token at most once.
    ///
    /// Any response other than 401 is returned as-is, success or not.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for a 401 on a public path, or a replay that is still 401.
    /// - `RefreshFailure` when the refresh this request depended on failed.
    /// - `Network` / `InvalidHeader` from the transport.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        // Generation first, credential second: a newer generation always
        // implies the credential store already holds the newer token.
        let generation = self.coordinator.generation();
        let outbound = attach(&request, self.credentials.get().as_ref())?;
        let response = self.transport.send(&outbound).await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }
        if self.matcher.is_public(&request.path) {
            debug!(path = %request.path, "401 on public path; refresh bypassed");
            return Err(response.rejection());
        }

        let replay = self
            .coordinator
            .coordinate(request, generation, || self.refresh())
            .await?;
        let outbound = attach(&replay.request, replay.token.as_ref())?;
        let response = self.transport.send(&outbound).await?;

        if response.is_unauthorized() {
            warn!(path = %replay.request.path, "still unauthorized after refresh; not retrying");
            return Err(response.rejection());
        }
        Ok(response)
    }

    /// The single refresh call. Sent straight to the transport: it is a
    /// public path and must never re-enter the pipeline.
    async fn refresh(&self) -> Result<AccessToken, SessionError> {
        let response = self
            .transport
            .send(&ApiRequest::post(self.refresh_path.as_str()))
            .await
            .map_err(|e| SessionError::RefreshFailure(e.to_string()))?;

        if !response.is_success() {
            let message = response
                .server_message()
                .unwrap_or_else(|| "refresh rejected".to_owned());
            return Err(SessionError::RefreshFailure(format!("status {}: {message}", response.status)));
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| SessionError::RefreshFailure(e.to_string()))?;
        Ok(body.access_token)
    }
}

fn attach(request: &ApiRequest, token: Option<&AccessToken>) -> Result<ApiRequest, SessionError> {
    match token {
        Some(token) => request.with_bearer(token),
        None => Ok(request.clone()),
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
