//! Session ownership: login, logout, and the single-flight proactive refresh.
//!
//! The manager is the only component that mutates the session triple
//! (token, expiry, user). Downstream stores observe it through the watch
//! channel and the auth-event broadcast, and gate their polling on
//! `is_authenticated()`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::ConsoleApi;
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, StoredCredentials};
use crate::error::ClientError;
use crate::models::UserSummary;

/// The in-memory session triple. `token` and `expires_at` are set and
/// cleared together; `user` is a cached profile.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<UserSummary>,
}

/// Lifecycle signals consumed by the downstream stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
}

pub struct SessionManager {
    api: Arc<dyn ConsoleApi>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    /// How long before expiry the proactive refresh fires.
    refresh_lead: Duration,
    session: watch::Sender<Session>,
    events: broadcast::Sender<AuthEvent>,
    /// Single-flight slot. `Some` exactly while one refresh call is
    /// outstanding; late callers subscribe to it instead of issuing another.
    refresh_inflight: Mutex<Option<broadcast::Sender<Result<String, ClientError>>>>,
    /// The one live proactive-refresh timer, if any.
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: &ClientConfig,
    ) -> Arc<Self> {
        let (session, _) = watch::channel(Session::default());
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            api,
            credentials,
            clock,
            refresh_lead: Duration::seconds(config.refresh_lead_secs),
            session,
            events,
            refresh_inflight: Mutex::new(None),
            refresh_timer: Mutex::new(None),
        })
    }

    // -- derived reads ------------------------------------------------------

    /// Token present and not yet expired. Expiry is re-evaluated against the
    /// clock on every call, never cached.
    pub fn is_authenticated(&self) -> bool {
        let session = self.session.borrow();
        match (&session.token, session.expires_at) {
            (Some(_), Some(expires_at)) => self.clock.now() < expires_at,
            _ => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        self.session
            .borrow()
            .user
            .as_ref()
            .is_some_and(|u| u.is_admin())
    }

    pub fn token(&self) -> Option<String> {
        self.session.borrow().token.clone()
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.session.borrow().user.clone()
    }

    /// Observe session changes (read-only).
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Observe login/logout transitions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Rehydrate a persisted session after a page reload.
    ///
    /// An already-expired persisted token is discarded instead of restored.
    /// Returns whether a live session was restored.
    pub fn restore(self: &Arc<Self>) -> bool {
        let Some(stored) = self.credentials.load() else {
            return false;
        };
        if self.clock.now() >= stored.expires_at {
            tracing::debug!("persisted session already expired; discarding");
            self.credentials.clear();
            return false;
        }
        self.install(stored.token, stored.expires_at, stored.user);
        let _ = self.events.send(AuthEvent::LoggedIn);
        true
    }

    /// Exchange credentials for a session. On any failure nothing is mutated.
    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<UserSummary, ClientError> {
        let grant = self.api.login(username, password).await?;
        let expires_at = self.clock.now() + Duration::seconds(grant.expires_in);

        // The profile fetch needs the new bearer; revert it if the fetch
        // fails so a failed login leaves no trace.
        let previous_bearer = self.token();
        self.api.set_bearer(Some(grant.token.clone()));
        let user = match self.api.me().await {
            Ok(user) => user,
            Err(e) => {
                self.api.set_bearer(previous_bearer);
                return Err(e);
            }
        };

        tracing::info!(user_id = %user.id, username = %user.username, "logged in");
        self.install(grant.token.clone(), expires_at, Some(user.clone()));
        self.credentials.save(&StoredCredentials {
            token: grant.token,
            expires_at,
            user: Some(user.clone()),
        });
        let _ = self.events.send(AuthEvent::LoggedIn);
        Ok(user)
    }

    /// Tear the session down. The server round-trip is best-effort; local
    /// state is cleared regardless.
    pub async fn logout(self: &Arc<Self>) {
        self.cancel_refresh_timer();
        if self.session.borrow().token.is_some() {
            if let Err(e) = self.api.logout().await {
                tracing::debug!(%e, "server logout failed; clearing locally anyway");
            }
        }
        self.clear_session();
        tracing::info!("logged out");
        let _ = self.events.send(AuthEvent::LoggedOut);
    }

    /// Cancel background work without logging out. For UI-shell teardown.
    pub fn shutdown(&self) {
        self.cancel_refresh_timer();
    }

    // -- refresh ------------------------------------------------------------

    /// Single-flight token refresh.
    ///
    /// The "already in flight?" check and the "mark in flight" mutation
    /// happen under one lock acquisition with no await between them, so at
    /// most one network call is ever outstanding; every concurrent caller
    /// resolves to that call's outcome.
    pub async fn ensure_fresh_token(self: &Arc<Self>) -> Result<String, ClientError> {
        let waiter = {
            let mut inflight = self.refresh_inflight.lock();
            match inflight.as_ref() {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    *inflight = Some(tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            return match rx.recv().await {
                Ok(outcome) => outcome,
                // The initiating task was torn down before settling.
                Err(_) => Err(ClientError::unauthorized("refresh was cancelled")),
            };
        }

        // The initiator can itself be aborted mid-flight (the proactive timer
        // task is cancelled by logout or a new login). The guard clears the
        // slot in that case; dropping the sender unparks every waiter, and
        // the next caller starts a fresh call instead of subscribing to a
        // flight that will never settle.
        let _guard = InflightGuard { manager: self };
        let outcome = self.do_refresh().await;

        // Clear the in-flight slot before waking waiters: a caller arriving
        // after settlement must start a fresh call, not attach to this one.
        let tx = self.refresh_inflight.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    async fn do_refresh(self: &Arc<Self>) -> Result<String, ClientError> {
        match self.api.refresh().await {
            Ok(grant) => {
                let expires_at = self.clock.now() + Duration::seconds(grant.expires_in);
                tracing::debug!(%expires_at, "token refreshed");
                let user = self.session.borrow().user.clone();
                self.install(grant.token.clone(), expires_at, user.clone());
                self.credentials.save(&StoredCredentials {
                    token: grant.token.clone(),
                    expires_at,
                    user,
                });
                Ok(grant.token)
            }
            Err(e) => {
                // Fatal for the session: clear everything and fall through to
                // a logged-out state. Never retried, never re-armed.
                tracing::warn!(%e, "token refresh failed; dropping session");
                self.cancel_refresh_timer();
                self.clear_session();
                let _ = self.events.send(AuthEvent::LoggedOut);
                Err(ClientError::unauthorized(format!(
                    "session refresh failed: {}",
                    e.message
                )))
            }
        }
    }

    // -- internals ----------------------------------------------------------

    /// Store a fresh token/expiry (and optional user), point the API at it,
    /// and re-arm the proactive refresh.
    fn install(
        self: &Arc<Self>,
        token: String,
        expires_at: DateTime<Utc>,
        user: Option<UserSummary>,
    ) {
        self.api.set_bearer(Some(token.clone()));
        self.session.send_replace(Session {
            token: Some(token),
            expires_at: Some(expires_at),
            user,
        });
        self.arm_refresh_timer(expires_at);
    }

    fn clear_session(&self) {
        self.session.send_replace(Session::default());
        self.credentials.clear();
        self.api.set_bearer(None);
    }

    /// Schedule the proactive refresh at `expires_at - lead`. If that instant
    /// is already in the past, refresh immediately: once, via the task
    /// queue, never as a synchronous loop. A renewal that keeps landing in
    /// the past degrades to refresh-on-every-renewal; a renewal that fails
    /// falls through to logout in `do_refresh`, so this cannot spin forever.
    fn arm_refresh_timer(self: &Arc<Self>, expires_at: DateTime<Utc>) {
        self.cancel_refresh_timer();
        let refresh_at = expires_at - self.refresh_lead;
        let delay = (refresh_at - self.clock.now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = manager.ensure_fresh_token().await;
        });
        *self.refresh_timer.lock() = Some(handle);
    }

    fn cancel_refresh_timer(&self) {
        if let Some(handle) = self.refresh_timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_refresh_timer();
    }
}

/// Held by the refresh initiator across its network call. Normal settlement
/// empties the slot first, making the drop a no-op; an aborted initiator
/// reaches it with the slot still occupied and releases it here.
struct InflightGuard<'a> {
    manager: &'a SessionManager,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        drop(self.manager.refresh_inflight.lock().take());
    }
}
