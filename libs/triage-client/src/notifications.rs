//! Notification state: push-delivered items merged with paginated pulls.
//!
//! The unread counter is a running counter, not a pure derivation of the
//! list: a pull sets it to the server-reported value, a push increments it,
//! mark/dismiss decrement it (clamped at zero). Pulls replace the list
//! wholesale, so no ordering assumption between a push and an in-flight
//! pull's response is needed.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ConsoleApi;
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::{Notification, NotificationFilters, NotificationPage, Severity};
use crate::push::PushMessage;
use crate::session::SessionManager;

/// Push payload for `notification.created`. `created_at` falls back to the
/// message timestamp when the server omits it.
#[derive(Debug, Deserialize)]
struct NotificationPayload {
    id: String,
    kind: String,
    severity: Severity,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    /// Newest first. Push-delivered items are prepended ahead of any
    /// pull-derived ordering; `id` is the dedup key across both sources.
    items: Vec<Notification>,
    total: u64,
    unread: u64,
    last_error: Option<ClientError>,
}

pub struct NotificationStore {
    api: Arc<dyn ConsoleApi>,
    session: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    poll_interval: StdDuration,
    inner: Mutex<Inner>,
    /// Bumped on every visible change so the UI can re-render.
    changed: watch::Sender<u64>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationStore {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        session: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
        config: &ClientConfig,
    ) -> Arc<Self> {
        let (changed, _) = watch::channel(0);
        Arc::new(Self {
            api,
            session,
            clock,
            poll_interval: StdDuration::from_secs(config.notification_poll_secs),
            inner: Mutex::new(Inner::default()),
            changed,
            poller: Mutex::new(None),
        })
    }

    // -- reads --------------------------------------------------------------

    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner.lock().items.clone()
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }

    pub fn unread_count(&self) -> u64 {
        self.inner.lock().unread
    }

    pub fn has_unread(&self) -> bool {
        self.unread_count() > 0
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.lock().last_error.clone()
    }

    /// Observe state changes (read-only version counter).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    // -- pull ---------------------------------------------------------------

    /// Pull a page and replace the local list, total, and unread counter
    /// wholesale. A failed pull keeps the previous state and records the
    /// error for the UI.
    pub async fn list(
        &self,
        page: u32,
        page_size: u32,
        filters: &NotificationFilters,
    ) -> Result<NotificationPage, ClientError> {
        match self.api.list_notifications(page, page_size, filters).await {
            Ok(pulled) => {
                let mut inner = self.inner.lock();
                inner.items = pulled.items.clone();
                inner.total = pulled.total;
                inner.unread = pulled.unread_count;
                inner.last_error = None;
                drop(inner);
                self.bump();
                Ok(pulled)
            }
            Err(e) => {
                tracing::warn!(%e, "notification pull failed");
                self.inner.lock().last_error = Some(e.clone());
                self.bump();
                Err(e)
            }
        }
    }

    // -- optimistic mutations -----------------------------------------------

    /// Flip an item to read locally, then tell the server. The local flip is
    /// never rolled back on server failure; the call result is surfaced.
    pub async fn mark_read(&self, id: &str) -> Result<(), ClientError> {
        self.flip_read(&[id]);
        self.bump();
        self.surface(self.api.mark_notification_read(id).await)
    }

    pub async fn mark_many_read(&self, ids: &[String]) -> Result<(), ClientError> {
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.flip_read(&refs);
        self.bump();
        self.surface(self.api.mark_notifications_read(ids).await)
    }

    pub async fn mark_all_read(&self) -> Result<(), ClientError> {
        {
            let mut inner = self.inner.lock();
            let now = self.clock.now();
            for item in inner.items.iter_mut().filter(|n| !n.read) {
                item.read = true;
                item.read_at = Some(now);
            }
            inner.unread = 0;
        }
        self.bump();
        self.surface(self.api.mark_all_notifications_read().await)
    }

    /// Remove an item locally; the unread counter drops only if the removed
    /// item was unread. The server delete is best-effort.
    pub async fn dismiss(&self, id: &str) -> Result<(), ClientError> {
        {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.items.iter().position(|n| n.id == id) {
                let removed = inner.items.remove(pos);
                if !removed.read {
                    inner.unread = inner.unread.saturating_sub(1);
                }
            }
        }
        self.bump();
        self.surface(self.api.delete_notification(id).await)
    }

    // -- push ingestion -----------------------------------------------------

    /// Ingest a push message from the `notifications` topic. The new item is
    /// prepended unread and the counter incremented, whether or not a pull
    /// has ever run. A duplicate id replaces the older copy in the list; the
    /// counter still increments, and the unread-count poll reconciles it.
    pub fn handle_push(&self, message: &PushMessage) {
        if message.event() != Some("notification.created") {
            tracing::debug!(event = ?message.event(), "ignoring notification push");
            return;
        }
        let payload: NotificationPayload = match serde_json::from_value(message.payload()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(?e, message_id = %message.id, "malformed notification push");
                return;
            }
        };

        let notification = Notification {
            id: payload.id,
            kind: payload.kind,
            severity: payload.severity,
            title: payload.title,
            body: payload.body,
            link: payload.link,
            read: false,
            read_at: None,
            created_at: payload.created_at.unwrap_or(message.timestamp),
        };

        let mut inner = self.inner.lock();
        inner.items.retain(|n| n.id != notification.id);
        inner.items.insert(0, notification);
        inner.unread += 1;
        drop(inner);
        self.bump();
    }

    // -- fallback polling ---------------------------------------------------

    /// Start the cheap unread-count poll that self-heals after missed push
    /// messages. Idempotent: calling while active is a no-op. Skipped
    /// entirely while unauthenticated.
    pub fn start_polling(self: &Arc<Self>) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                if !store.session.is_authenticated() {
                    continue;
                }
                match store.api.unread_count().await {
                    Ok(count) => {
                        store.inner.lock().unread = count;
                        store.bump();
                    }
                    Err(e) => {
                        tracing::debug!(%e, "unread-count poll failed");
                    }
                }
            }
        });
        *poller = Some(handle);
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }

    /// Wipe everything. Called on logout.
    pub fn clear(&self) {
        self.stop_polling();
        *self.inner.lock() = Inner::default();
        self.bump();
    }

    // -- internals ----------------------------------------------------------

    fn flip_read(&self, ids: &[&str]) {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        let Inner { items, unread, .. } = &mut *inner;
        for id in ids {
            if let Some(item) = items.iter_mut().find(|n| n.id == *id && !n.read) {
                item.read = true;
                item.read_at = Some(now);
                *unread = unread.saturating_sub(1);
            }
        }
    }

    fn surface(&self, result: Result<(), ClientError>) -> Result<(), ClientError> {
        if let Err(e) = &result {
            tracing::warn!(%e, "notification server call failed (local state kept)");
            self.inner.lock().last_error = Some(e.clone());
            self.bump();
        }
        result
    }

    fn bump(&self) {
        self.changed.send_modify(|v| *v += 1);
    }
}

impl Drop for NotificationStore {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
