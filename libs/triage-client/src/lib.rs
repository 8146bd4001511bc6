//! Session and real-time state coordination for the Triage console.
//!
//! The crate owns the pieces of the client with real invariants: the
//! session manager (token lifecycle, single-flight proactive refresh), the
//! notification store, and the live dashboard store, all reconciling a push
//! channel with periodic pulls. Rendering, routing, and the push transport
//! itself live elsewhere.

pub mod api;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod notifications;
pub mod push;
pub mod session;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use api::{ConsoleApi, HttpApi};
use clock::{Clock, SystemClock};
use config::ClientConfig;
use credentials::{CredentialStore, MemoryCredentialStore};
use dashboard::DashboardStore;
use notifications::NotificationStore;
use push::{PushHub, Topic};
use session::{AuthEvent, SessionManager};

/// The composed client core, injected into whatever drives the UI shell.
///
/// Lifecycle: `new` → (`session.restore()` or `session.login(...)`) → use →
/// `teardown`. Construction wires the auth-event listener that starts both
/// stores' polling on login and clears them on logout.
pub struct Services {
    pub config: ClientConfig,
    pub api: Arc<dyn ConsoleApi>,
    pub session: Arc<SessionManager>,
    pub notifications: Arc<NotificationStore>,
    pub dashboard: Arc<DashboardStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Services {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn ConsoleApi>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let session = SessionManager::new(
            Arc::clone(&api),
            credentials,
            Arc::clone(&clock),
            &config,
        );
        let notifications = NotificationStore::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&clock),
            &config,
        );
        let dashboard = DashboardStore::new(Arc::clone(&api), Arc::clone(&session));

        let services = Arc::new(Self {
            config,
            api,
            session,
            notifications,
            dashboard,
            tasks: Mutex::new(Vec::new()),
        });
        services.spawn_auth_listener();
        services
    }

    /// Production wiring: HTTP API, in-memory credential store, system clock.
    pub fn with_http(config: ClientConfig) -> Arc<Self> {
        let api: Arc<dyn ConsoleApi> = Arc::new(HttpApi::new(&config.base_url));
        Services::new(
            config,
            api,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Consume a push hub: one pump task dispatches each inbound message to
    /// the store owning its topic. Messages arriving while unauthenticated
    /// are dropped; a cleared session must not be resurrected by a late push.
    pub fn connect_push(self: &Arc<Self>, hub: &PushHub) {
        let mut rx = hub.subscribe();
        let session = Arc::clone(&self.session);
        let notifications = Arc::clone(&self.notifications);
        let dashboard = Arc::clone(&self.dashboard);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(tm) => {
                        if !session.is_authenticated() {
                            continue;
                        }
                        match tm.topic.as_str() {
                            Topic::NOTIFICATIONS => notifications.handle_push(&tm.message),
                            Topic::DASHBOARD_ALERTS => dashboard.handle_alert(&tm.message),
                            Topic::DASHBOARD_EVENTS => dashboard.handle_event(&tm.message),
                            Topic::DASHBOARD_STATS => dashboard.handle_stats(&tm.message),
                            Topic::DASHBOARD_DETECTIONS => dashboard.handle_detection(&tm.message),
                            other => {
                                tracing::debug!(topic = %other, "unhandled push topic");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The polling fallback reconciles whatever we missed.
                        tracing::warn!(skipped, "push consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Stop all background work. Does not log out, so a reload can restore the
    /// persisted session afterwards.
    pub fn teardown(&self) {
        self.notifications.stop_polling();
        self.dashboard.stop_polling();
        self.session.shutdown();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    fn spawn_auth_listener(self: &Arc<Self>) {
        let mut events = self.session.subscribe_events();
        let notifications = Arc::clone(&self.notifications);
        let dashboard = Arc::clone(&self.dashboard);
        let dashboard_poll_ms = self.config.dashboard_poll_ms;
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::LoggedIn) => {
                        notifications.start_polling();
                        dashboard.start_polling(dashboard_poll_ms);
                    }
                    Ok(AuthEvent::LoggedOut) => {
                        notifications.clear();
                        dashboard.clear();
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
