//! Session state for the current client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Route guards and identity-aware components read this to decide whether to
//! redirect to a login flow. Only `SessionFacade` and `RefreshCoordinator`
//! write it.
//!
//! DESIGN
//! ======
//! The snapshot lives in a `watch` channel: every mutation is one atomic
//! `send_modify`, and observers can either read the latest value or await
//! changes. The methods here are the only writers, which keeps the
//! "user present only while authenticated" invariant in one place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Opaque identity payload returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(serde_json::Value);

impl UserRecord {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Look up a top-level field of the payload.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// The `id` field, when the API provides one as a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub user: Option<UserRecord>,
    pub initialized: bool,
}

/// Shared handle to the session snapshot. Clones observe the same state.
#[derive(Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().authenticated
    }

    #[must_use]
    pub fn user(&self) -> Option<UserRecord> {
        self.tx.borrow().user.clone()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.tx.borrow().initialized
    }

    /// Receiver that yields a new snapshot after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Replace the user wholesale and mark the session authenticated.
    pub fn set_user(&self, user: UserRecord) {
        self.mark_authenticated(Some(user));
    }

    /// Mark the session authenticated. `user` replaces any previous record,
    /// including with `None` when the server did not return one.
    pub fn mark_authenticated(&self, user: Option<UserRecord>) {
        self.tx.send_modify(|s| {
            s.authenticated = true;
            s.user = user;
        });
    }

    /// Drop authentication and the user record. `initialized` is untouched.
    pub fn clear(&self) {
        self.tx.send_if_modified(|s| {
            let changed = s.authenticated || s.user.is_some();
            s.authenticated = false;
            s.user = None;
            changed
        });
    }

    /// Flip `initialized` to true. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_initialized(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.initialized {
                return false;
            }
            s.initialized = true;
            true
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
