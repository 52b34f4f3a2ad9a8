//! Single-flight access-token refresh.
//!
//! ARCHITECTURE
//! ============
//! The first caller to report a 401 while the coordinator is `Idle` becomes
//! the leader: it flips the phase to `Refreshing` and performs the one
//! refresh call itself. Callers reporting a 401 while a refresh is in flight
//! become `PendingCaller`s: an immutable snapshot of their request plus a
//! oneshot settlement channel, appended to a FIFO queue. When the refresh
//! resolves, the leader drains the queue in order, sending each waiter either
//! the renewed credential (with its own request back, ready to replay) or
//! the shared refresh error.
//!
//! INVARIANTS
//! ==========
//! - At most one refresh is in flight per coordinator.
//! - `queue` is non-empty only while `phase == Refreshing`; phase change and
//!   queue drain happen in one critical section.
//! - Every `PendingCaller` is settled exactly once, including when the
//!   leader's future is dropped mid-refresh.
//! - The mutex is never held across an `.await`.
//!
//! TRADE-OFFS
//! ==========
//! A 401 can arrive after the refresh it should have waited for already
//! finished (the request left with the old token, the response came back
//! late). Callers pass the `generation` they observed before sending. Every
//! settled refresh, successful or not, bumps the generation and records its
//! outcome; a caller reporting against an older generation receives that
//! outcome (replay with the current credential, or the same refresh error)
//! instead of starting another refresh.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credentials::{AccessToken, CredentialStore};
use crate::error::SessionError;
use crate::state::SessionState;
use crate::transport::ApiRequest;

const REFRESH_ABANDONED: &str = "refresh abandoned before completion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
}

/// A request cleared for a single replay, with the credential to use.
///
/// `token` is `None` only when the session relies on cookies alone and no
/// bearer credential is stored.
#[derive(Debug, Clone)]
pub struct Replay {
    pub request: ApiRequest,
    pub token: Option<AccessToken>,
}

type Settlement = Result<Replay, SessionError>;

struct PendingCaller {
    id: Uuid,
    request: ApiRequest,
    settle: oneshot::Sender<Settlement>,
}

struct Inner {
    phase: Phase,
    queue: VecDeque<PendingCaller>,
    /// Bumped every time a refresh settles, whatever the outcome.
    generation: u64,
    /// Failure of the most recent settled refresh; `None` after a success.
    last_failure: Option<SessionError>,
}

enum Role {
    Leader,
    Follower(Uuid, oneshot::Receiver<Settlement>),
    Stale(Option<SessionError>),
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    session: SessionState,
    credentials: CredentialStore,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(session: SessionState, credentials: CredentialStore) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                queue: VecDeque::new(),
                generation: 0,
                last_failure: None,
            }),
            session,
            credentials,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of callers waiting on the in-flight refresh.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Read this before sending a request and pass it to [`Self::coordinate`]
    /// if the request comes back 401.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Resolve a 401 for `request`, which was sent while `sent_generation`
    /// was current. `refresh` is invoked only if this caller becomes the
    /// leader.
    ///
    /// # Errors
    ///
    /// Returns `RefreshFailure` when the refresh this caller led or waited on
    /// failed (or was abandoned).
    pub async fn coordinate<F, Fut>(
        &self,
        request: ApiRequest,
        sent_generation: u64,
        refresh: F,
    ) -> Result<Replay, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, SessionError>>,
    {
        let role = {
            let mut inner = self.lock();
            let phase = inner.phase;
            match phase {
                Phase::Refreshing => {
                    let (settle, rx) = oneshot::channel();
                    let id = Uuid::new_v4();
                    inner.queue.push_back(PendingCaller { id, request: request.clone(), settle });
                    debug!(%id, method = %request.method, path = %request.path, queued = inner.queue.len(), "waiting on in-flight refresh");
                    Role::Follower(id, rx)
                }
                Phase::Idle if inner.generation != sent_generation => Role::Stale(inner.last_failure.clone()),
                Phase::Idle => {
                    inner.phase = Phase::Refreshing;
                    Role::Leader
                }
            }
        };

        match role {
            Role::Follower(id, rx) => rx.await.unwrap_or_else(|_| {
                warn!(%id, "refresh settlement dropped");
                Err(SessionError::RefreshFailure(REFRESH_ABANDONED.into()))
            }),
            Role::Stale(None) => {
                debug!(path = %request.path, "credential already renewed; replaying without refresh");
                Ok(Replay { request, token: self.credentials.get() })
            }
            Role::Stale(Some(err)) => {
                debug!(path = %request.path, error = %err, "sent before a failed refresh; sharing its error");
                Err(err)
            }
            Role::Leader => self.lead(request, refresh).await,
        }
    }

    async fn lead<F, Fut>(&self, request: ApiRequest, refresh: F) -> Result<Replay, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, SessionError>>,
    {
        let mut guard = AbandonGuard { coordinator: self, armed: true };
        info!(path = %request.path, "access token rejected; refreshing");
        let outcome = refresh().await;
        guard.armed = false;

        match outcome {
            Ok(token) => {
                self.credentials.set(token.clone());
                let replayed = self.settle(Ok(&token)).len();
                info!(replayed, "token refresh succeeded");
                Ok(Replay { request, token: Some(token) })
            }
            Err(err) => {
                let err = as_refresh_failure(err);
                self.session.clear();
                self.credentials.clear();
                let failed = self.settle(Err(&err)).len();
                warn!(error = %err, failed, "token refresh failed; session cleared");
                Err(err)
            }
        }
    }

    /// Return to `Idle` and settle every queued caller in FIFO order.
    /// Returns the ids of the settled callers, in settlement order.
    fn settle(&self, outcome: Result<&AccessToken, &SessionError>) -> Vec<Uuid> {
        let drained: Vec<PendingCaller> = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.last_failure = outcome.err().cloned();
            inner.phase = Phase::Idle;
            inner.queue.drain(..).collect()
        };

        let mut settled = Vec::with_capacity(drained.len());
        for PendingCaller { id, request, settle } in drained {
            settled.push(id);
            let settlement = match outcome {
                Ok(token) => Ok(Replay { request, token: Some(token.clone()) }),
                Err(err) => Err(err.clone()),
            };
            if settle.send(settlement).is_err() {
                debug!(%id, "pending caller went away before settlement");
            }
        }
        settled
    }

    /// Queued callers in queue order.
    #[cfg(test)]
    fn pending(&self) -> Vec<(Uuid, String)> {
        self.lock()
            .queue
            .iter()
            .map(|p| (p.id, p.request.path.clone()))
            .collect()
    }
}

/// Settles the queue with a failure if the leader's future is dropped while
/// the refresh is still outstanding.
struct AbandonGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let err = SessionError::RefreshFailure(REFRESH_ABANDONED.into());
            let failed = self.coordinator.settle(Err(&err)).len();
            warn!(failed, "refresh leader dropped; waiters failed");
        }
    }
}

fn as_refresh_failure(err: SessionError) -> SessionError {
    match err {
        SessionError::RefreshFailure(_) => err,
        other => SessionError::RefreshFailure(other.to_string()),
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::time::Duration;

    /// Poll until `n` callers are queued behind the in-flight refresh.
    pub async fn wait_for_queued(coordinator: &RefreshCoordinator, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.queued() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("callers never queued");
    }

    /// Poll until the coordinator reaches `phase`.
    pub async fn wait_for_phase(coordinator: &RefreshCoordinator, phase: Phase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.phase() != phase {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("coordinator never reached phase");
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
