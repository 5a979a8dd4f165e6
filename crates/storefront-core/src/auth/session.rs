//! The client-side session: who is logged in, and the operations that change it.
//!
//! A `SessionManager` is created once per front end and handed to whatever
//! needs it; clones share the same state. Readers take snapshots or subscribe
//! to changes, only the manager's own operations write.
//!
//! ```text
//!            check ok / login ok
//!   Unknown ─────────────────────► Authenticated
//!      │                             ▲       │
//!      │ check failed   check ok /   │       │ logout
//!      │                login ok     │       ▼
//!      └──────────────────────► Unauthenticated ◄── logout (any state)
//! ```
//!
//! Concurrent operations are not serialized: each applies its result when its
//! request resolves, so the last response to arrive wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::AuthBackend;
use crate::models::{Credentials, Registration, User};

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthStatus {
    /// The initial check has not resolved yet.
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// A snapshot of the session.
///
/// Login status is derived from the user record, never stored beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionState {
    current_user: Option<User>,
    is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_user: None,
            is_loading: true,
        }
    }
}

impl SessionState {
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn status(&self) -> AuthStatus {
        match (&self.current_user, self.is_loading) {
            (Some(_), _) => AuthStatus::Authenticated,
            (None, true) => AuthStatus::Unknown,
            (None, false) => AuthStatus::Unauthenticated,
        }
    }
}

/// Clears the loading flag when a check ends, including when the check's
/// future is dropped before the backend answers.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_if_modified(|s| std::mem::replace(&mut s.is_loading, false));
    }
}

#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    state: Arc<watch::Sender<SessionState>>,
    bootstrapped: Arc<AtomicBool>,
}

impl SessionManager {
    /// Create a manager in the `Unknown` state without contacting the backend.
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            state: Arc::new(state),
            bootstrapped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a manager and resolve the real session in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(backend: Arc<dyn AuthBackend>) -> Self {
        let manager = Self::new(backend);
        let task = manager.clone();
        tokio::spawn(async move {
            task.bootstrap().await;
        });
        manager
    }

    /// Run the initial check. Only the first call on a manager (or any of its
    /// clones) does anything; returns whether this call ran it.
    pub async fn bootstrap(&self) -> bool {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.check_auth().await;
        true
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().is_logged_in()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the initial check has resolved, then return the state.
    ///
    /// On a manager from `new` that nobody has bootstrapped yet, this runs the
    /// initial check itself.
    pub async fn resolved(&self) -> SessionState {
        if self.is_loading() {
            self.bootstrap().await;
        }
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|s| !s.is_loading).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        };
        state
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Ask the backend who we are. Any failure means "not logged in".
    pub async fn check_auth(&self) -> Option<User> {
        let guard = LoadingGuard { state: &self.state };

        let user = match self.backend.current_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session is authenticated");
                Some(user)
            }
            Err(e) if e.is_unauthorized() => {
                debug!("No active session");
                None
            }
            Err(e) => {
                warn!(error = %e, "Session check failed, treating as logged out");
                None
            }
        };

        self.state.send_modify(|s| {
            s.current_user = user.clone();
            s.is_loading = false;
        });
        drop(guard);

        user
    }

    /// Validate the credentials, then log in.
    ///
    /// Invalid input is rejected before any request is made. A rejected login
    /// leaves the session as it was.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        credentials.validate()?;

        let user = self.backend.login(credentials).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            e
        })?;

        self.state.send_modify(|s| {
            s.current_user = Some(user.clone());
            s.is_loading = false;
        });
        info!(user_id = %user.id, "Logged in");

        Ok(user)
    }

    /// Log out. Local state is cleared even when the backend call fails.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            warn!(error = %e, "Logout request failed, clearing local session anyway");
        }

        self.state.send_modify(|s| {
            s.current_user = None;
            s.is_loading = false;
        });
        info!("Logged out");
    }

    /// Validate a sign-up form, then create the account.
    ///
    /// Does not log the new account in.
    pub async fn register(&self, registration: &Registration) -> Result<(), AuthError> {
        registration.validate()?;
        self.backend.register(registration).await.map_err(|e| {
            warn!(error = %e, "Registration failed");
            e
        })?;
        info!("Account registered");
        Ok(())
    }
}
