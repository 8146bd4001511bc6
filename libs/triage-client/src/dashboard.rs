//! Live operational dashboard state: bounded push buffers plus periodic pulls.
//!
//! Pulls replace their slice wholesale; push messages adjust the cached
//! counters incrementally so the visible numbers stay correct between pull
//! cycles, whichever order the two sources land in.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ConsoleApi;
use crate::error::ClientError;
use crate::models::{
    DashboardStats, HeatmapCell, LiveAlert, LiveEvent, Severity, SeverityBucket, TimeRange,
    TimelineBucket, TimelineInterval, TopRule,
};
use crate::push::PushMessage;
use crate::session::SessionManager;

/// Bound of the live-alert ring buffer.
const LIVE_ALERT_CAP: usize = 50;
/// Bound of the live-event ring buffer.
const LIVE_EVENT_CAP: usize = 100;

/// Per-slice fetch failure flags, for UI display. A set flag means the slice
/// is showing its last-known (or default) value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceErrors {
    pub stats: bool,
    pub timeline: bool,
    pub top_rules: bool,
    pub severity: bool,
    pub heatmap: bool,
}

#[derive(Debug, Deserialize)]
struct AlertPayload {
    id: String,
    rule_name: String,
    severity: Severity,
    title: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    id: String,
    kind: String,
    source: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DetectionPayload {
    technique_id: String,
    #[serde(default)]
    tactic: Option<String>,
}

#[derive(Default)]
struct Inner {
    stats: DashboardStats,
    timeline: Vec<TimelineBucket>,
    top_rules: Vec<TopRule>,
    severity: Vec<SeverityBucket>,
    heatmap: Vec<HeatmapCell>,
    /// Newest first, capped at [`LIVE_ALERT_CAP`]. Oldest dropped silently.
    live_alerts: VecDeque<LiveAlert>,
    /// Newest first, capped at [`LIVE_EVENT_CAP`].
    live_events: VecDeque<LiveEvent>,
    errors: SliceErrors,
    range: TimeRange,
    interval: TimelineInterval,
}

pub struct DashboardStore {
    api: Arc<dyn ConsoleApi>,
    session: Arc<SessionManager>,
    inner: Mutex<Inner>,
    /// Bumped on every visible change so the UI can re-render.
    changed: watch::Sender<u64>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl DashboardStore {
    pub fn new(api: Arc<dyn ConsoleApi>, session: Arc<SessionManager>) -> Arc<Self> {
        let (changed, _) = watch::channel(0);
        Arc::new(Self {
            api,
            session,
            inner: Mutex::new(Inner::default()),
            changed,
            poller: Mutex::new(None),
        })
    }

    // -- reads --------------------------------------------------------------

    pub fn stats(&self) -> DashboardStats {
        self.inner.lock().stats.clone()
    }

    pub fn timeline(&self) -> Vec<TimelineBucket> {
        self.inner.lock().timeline.clone()
    }

    pub fn top_rules(&self) -> Vec<TopRule> {
        self.inner.lock().top_rules.clone()
    }

    pub fn severity_breakdown(&self) -> Vec<SeverityBucket> {
        self.inner.lock().severity.clone()
    }

    pub fn technique_heatmap(&self) -> Vec<HeatmapCell> {
        self.inner.lock().heatmap.clone()
    }

    pub fn live_alerts(&self) -> Vec<LiveAlert> {
        self.inner.lock().live_alerts.iter().cloned().collect()
    }

    pub fn live_events(&self) -> Vec<LiveEvent> {
        self.inner.lock().live_events.iter().cloned().collect()
    }

    pub fn errors(&self) -> SliceErrors {
        self.inner.lock().errors
    }

    pub fn time_range(&self) -> TimeRange {
        self.inner.lock().range
    }

    pub fn timeline_interval(&self) -> TimelineInterval {
        self.inner.lock().interval
    }

    /// Observe state changes (read-only version counter).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    // -- pulls --------------------------------------------------------------

    /// Pull every slice in parallel. Each sub-fetch fails independently: a
    /// failure flags its slice and leaves the previous value in place without
    /// aborting the others.
    pub async fn refresh(&self) {
        let (range, interval) = {
            let inner = self.inner.lock();
            (inner.range, inner.interval)
        };
        let (stats, timeline, top_rules, severity, heatmap) = tokio::join!(
            self.api.stats(range),
            self.api.timeline(range, interval),
            self.api.top_rules(range),
            self.api.severity_breakdown(range),
            self.api.technique_heatmap(range),
        );

        let mut inner = self.inner.lock();
        let state = &mut *inner;
        apply_slice(stats, &mut state.stats, &mut state.errors.stats, "stats");
        apply_slice(
            timeline,
            &mut state.timeline,
            &mut state.errors.timeline,
            "timeline",
        );
        apply_slice(
            top_rules,
            &mut state.top_rules,
            &mut state.errors.top_rules,
            "top-rules",
        );
        apply_slice(
            severity,
            &mut state.severity,
            &mut state.errors.severity,
            "severity",
        );
        apply_slice(
            heatmap,
            &mut state.heatmap,
            &mut state.errors.heatmap,
            "heatmap",
        );
        drop(inner);
        self.bump();
    }

    /// The cheap stats-only pull used by the polling loop.
    pub async fn refresh_stats(&self) {
        let range = self.inner.lock().range;
        let result = self.api.stats(range).await;
        let mut inner = self.inner.lock();
        let state = &mut *inner;
        apply_slice(result, &mut state.stats, &mut state.errors.stats, "stats");
        drop(inner);
        self.bump();
    }

    /// Change the query window and re-pull everything that depends on it.
    pub async fn set_time_range(&self, range: TimeRange) {
        self.inner.lock().range = range;
        self.refresh().await;
    }

    /// Change the timeline bucket width and re-pull only the timeline.
    pub async fn set_timeline_interval(&self, interval: TimelineInterval) {
        let range = {
            let mut inner = self.inner.lock();
            inner.interval = interval;
            inner.range
        };
        let result = self.api.timeline(range, interval).await;
        let mut inner = self.inner.lock();
        let state = &mut *inner;
        apply_slice(
            result,
            &mut state.timeline,
            &mut state.errors.timeline,
            "timeline",
        );
        drop(inner);
        self.bump();
    }

    // -- push ingestion -----------------------------------------------------

    /// Ingest an alert from `dashboard:alerts`: prepend to the bounded live
    /// buffer and bump the cached counters so they stay correct between
    /// pull cycles.
    pub fn handle_alert(&self, message: &PushMessage) {
        if message.event() != Some("alert.created") {
            return;
        }
        let payload: AlertPayload = match serde_json::from_value(message.payload()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(?e, message_id = %message.id, "malformed alert push");
                return;
            }
        };

        let mut inner = self.inner.lock();
        inner.live_alerts.push_front(LiveAlert {
            id: payload.id,
            rule_name: payload.rule_name,
            severity: payload.severity,
            title: payload.title,
            source: payload.source,
            received_at: message.timestamp,
        });
        while inner.live_alerts.len() > LIVE_ALERT_CAP {
            inner.live_alerts.pop_back();
        }
        inner.stats.alerts.total += 1;
        inner.stats.alerts.open += 1;
        match payload.severity {
            Severity::Critical => inner.stats.alerts.critical += 1,
            Severity::High => inner.stats.alerts.high += 1,
            _ => {}
        }
        drop(inner);
        self.bump();
    }

    /// Ingest a raw event from `dashboard:events`. Same discipline as alerts
    /// against the 100-item buffer and the event-total counter.
    pub fn handle_event(&self, message: &PushMessage) {
        if message.event() != Some("event.created") {
            return;
        }
        let payload: EventPayload = match serde_json::from_value(message.payload()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(?e, message_id = %message.id, "malformed event push");
                return;
            }
        };

        let mut inner = self.inner.lock();
        inner.live_events.push_front(LiveEvent {
            id: payload.id,
            kind: payload.kind,
            source: payload.source,
            message: payload.message,
            received_at: message.timestamp,
        });
        while inner.live_events.len() > LIVE_EVENT_CAP {
            inner.live_events.pop_back();
        }
        inner.stats.events += 1;
        drop(inner);
        self.bump();
    }

    /// A full stats snapshot pushed by the server overwrites the cached one
    /// outright (server-initiated reconciliation).
    pub fn handle_stats(&self, message: &PushMessage) {
        if message.event() != Some("stats.snapshot") {
            return;
        }
        let stats: DashboardStats = match serde_json::from_value(message.payload()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(?e, message_id = %message.id, "malformed stats push");
                return;
            }
        };
        let mut inner = self.inner.lock();
        inner.stats = stats;
        inner.errors.stats = false;
        drop(inner);
        self.bump();
    }

    /// Ingest a detection from `dashboard:detections`: bump the matching
    /// technique cell so the heatmap tracks between pulls.
    pub fn handle_detection(&self, message: &PushMessage) {
        if message.event() != Some("detection.created") {
            return;
        }
        let payload: DetectionPayload = match serde_json::from_value(message.payload()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(?e, message_id = %message.id, "malformed detection push");
                return;
            }
        };
        let mut inner = self.inner.lock();
        match inner
            .heatmap
            .iter()
            .position(|c| c.technique_id == payload.technique_id)
        {
            Some(i) => inner.heatmap[i].count += 1,
            None => inner.heatmap.push(HeatmapCell {
                technique_id: payload.technique_id,
                tactic: payload.tactic,
                count: 1,
            }),
        }
        drop(inner);
        self.bump();
    }

    // -- local buffer edits -------------------------------------------------

    pub fn dismiss_alert(&self, id: &str) {
        self.inner.lock().live_alerts.retain(|a| a.id != id);
        self.bump();
    }

    pub fn clear_live_alerts(&self) {
        self.inner.lock().live_alerts.clear();
        self.bump();
    }

    pub fn clear_live_events(&self) {
        self.inner.lock().live_events.clear();
        self.bump();
    }

    // -- polling ------------------------------------------------------------

    /// Start the recurring stats-only re-pull. Idempotent: calling while
    /// already active is a no-op. Polls are skipped while unauthenticated.
    pub fn start_polling(self: &Arc<Self>, interval_ms: u64) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_millis(interval_ms));
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                ticker.tick().await;
                if !store.session.is_authenticated() {
                    continue;
                }
                store.refresh_stats().await;
            }
        });
        *poller = Some(handle);
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }

    /// Reset every slice and buffer. Called on logout.
    pub fn clear(&self) {
        self.stop_polling();
        *self.inner.lock() = Inner::default();
        self.bump();
    }

    fn bump(&self) {
        self.changed.send_modify(|v| *v += 1);
    }
}

impl Drop for DashboardStore {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

/// Replace a slice with a successful pull, or flag it and keep the previous
/// value on failure.
fn apply_slice<T>(result: Result<T, ClientError>, slot: &mut T, flag: &mut bool, name: &str) {
    match result {
        Ok(value) => {
            *slot = value;
            *flag = false;
        }
        Err(e) => {
            tracing::warn!(%e, slice = name, "dashboard fetch failed; keeping previous value");
            *flag = true;
        }
    }
}
