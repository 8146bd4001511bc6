#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use triage_client::api::ConsoleApi;
use triage_client::clock::ManualClock;
use triage_client::config::ClientConfig;
use triage_client::credentials::MemoryCredentialStore;
use triage_client::dashboard::DashboardStore;
use triage_client::error::ClientError;
use triage_client::models::{
    DashboardStats, HeatmapCell, Notification, NotificationFilters, NotificationPage, Severity,
    SeverityBucket, TimeRange, TimelineBucket, TimelineInterval, TokenGrant, TopRule, UserSummary,
};
use triage_client::notifications::NotificationStore;
use triage_client::push::PushMessage;
use triage_client::session::SessionManager;

/// A scripted [`ConsoleApi`]: every endpoint counts its calls and returns a
/// result the test can swap out.
pub struct MockApi {
    pub bearer: Mutex<Option<String>>,

    pub login_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub mark_many_calls: AtomicUsize,
    pub mark_all_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub unread_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub timeline_calls: AtomicUsize,
    pub top_rules_calls: AtomicUsize,
    pub severity_calls: AtomicUsize,
    pub heatmap_calls: AtomicUsize,

    pub login_result: Mutex<Result<TokenGrant, ClientError>>,
    pub me_result: Mutex<Result<UserSummary, ClientError>>,
    pub refresh_result: Mutex<Result<TokenGrant, ClientError>>,
    pub mark_read_result: Mutex<Result<(), ClientError>>,
    pub list_result: Mutex<Result<NotificationPage, ClientError>>,
    pub unread_result: Mutex<Result<u64, ClientError>>,
    pub stats_result: Mutex<Result<DashboardStats, ClientError>>,
    pub timeline_result: Mutex<Result<Vec<TimelineBucket>, ClientError>>,
    pub top_rules_result: Mutex<Result<Vec<TopRule>, ClientError>>,
    pub severity_result: Mutex<Result<Vec<SeverityBucket>, ClientError>>,
    pub heatmap_result: Mutex<Result<Vec<HeatmapCell>, ClientError>>,

    /// The `range` the last stats pull asked for.
    pub last_range: Mutex<Option<TimeRange>>,
    /// When set, `refresh` waits for one permit before settling.
    pub refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            bearer: Mutex::new(None),
            login_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            mark_read_calls: AtomicUsize::new(0),
            mark_many_calls: AtomicUsize::new(0),
            mark_all_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            unread_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            timeline_calls: AtomicUsize::new(0),
            top_rules_calls: AtomicUsize::new(0),
            severity_calls: AtomicUsize::new(0),
            heatmap_calls: AtomicUsize::new(0),
            login_result: Mutex::new(Ok(TokenGrant {
                token: "T1".to_string(),
                expires_in: 3600,
            })),
            me_result: Mutex::new(Ok(user("usr_1", "alice", "analyst"))),
            refresh_result: Mutex::new(Ok(TokenGrant {
                token: "T2".to_string(),
                expires_in: 3600,
            })),
            mark_read_result: Mutex::new(Ok(())),
            list_result: Mutex::new(Ok(NotificationPage {
                items: Vec::new(),
                total: 0,
                unread_count: 0,
            })),
            unread_result: Mutex::new(Ok(0)),
            stats_result: Mutex::new(Ok(DashboardStats::default())),
            timeline_result: Mutex::new(Ok(Vec::new())),
            top_rules_result: Mutex::new(Ok(Vec::new())),
            severity_result: Mutex::new(Ok(Vec::new())),
            heatmap_result: Mutex::new(Ok(Vec::new())),
            last_range: Mutex::new(None),
            refresh_gate: Mutex::new(None),
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsoleApi for MockApi {
    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.lock() = token;
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<TokenGrant, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_result.lock().clone()
    }

    async fn me(&self) -> Result<UserSummary, ClientError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.me_result.lock().clone()
    }

    async fn refresh(&self) -> Result<TokenGrant, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.refresh_result.lock().clone()
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_notifications(
        &self,
        _page: u32,
        _page_size: u32,
        _filters: &NotificationFilters,
    ) -> Result<NotificationPage, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_result.lock().clone()
    }

    async fn mark_notification_read(&self, _id: &str) -> Result<(), ClientError> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.mark_read_result.lock().clone()
    }

    async fn mark_notifications_read(&self, _ids: &[String]) -> Result<(), ClientError> {
        self.mark_many_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ClientError> {
        self.mark_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_notification(&self, _id: &str) -> Result<(), ClientError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64, ClientError> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        self.unread_result.lock().clone()
    }

    async fn stats(&self, range: TimeRange) -> Result<DashboardStats, ClientError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_range.lock() = Some(range);
        self.stats_result.lock().clone()
    }

    async fn timeline(
        &self,
        _range: TimeRange,
        _interval: TimelineInterval,
    ) -> Result<Vec<TimelineBucket>, ClientError> {
        self.timeline_calls.fetch_add(1, Ordering::SeqCst);
        self.timeline_result.lock().clone()
    }

    async fn top_rules(&self, _range: TimeRange) -> Result<Vec<TopRule>, ClientError> {
        self.top_rules_calls.fetch_add(1, Ordering::SeqCst);
        self.top_rules_result.lock().clone()
    }

    async fn severity_breakdown(
        &self,
        _range: TimeRange,
    ) -> Result<Vec<SeverityBucket>, ClientError> {
        self.severity_calls.fetch_add(1, Ordering::SeqCst);
        self.severity_result.lock().clone()
    }

    async fn technique_heatmap(&self, _range: TimeRange) -> Result<Vec<HeatmapCell>, ClientError> {
        self.heatmap_calls.fetch_add(1, Ordering::SeqCst);
        self.heatmap_result.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub api: Arc<MockApi>,
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub session: Arc<SessionManager>,
}

pub fn config() -> ClientConfig {
    ClientConfig::new("http://test.invalid")
}

pub fn fixture() -> Fixture {
    init_tracing();
    let api = Arc::new(MockApi::new());
    let clock = Arc::new(ManualClock::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    let session = SessionManager::new(
        api.clone() as Arc<dyn ConsoleApi>,
        credentials.clone(),
        clock.clone(),
        &config(),
    );
    Fixture {
        api,
        clock,
        credentials,
        session,
    }
}

pub fn notification_store(f: &Fixture) -> Arc<NotificationStore> {
    NotificationStore::new(
        f.api.clone() as Arc<dyn ConsoleApi>,
        f.session.clone(),
        f.clock.clone(),
        &config(),
    )
}

pub fn dashboard_store(f: &Fixture) -> Arc<DashboardStore> {
    DashboardStore::new(f.api.clone() as Arc<dyn ConsoleApi>, f.session.clone())
}

/// Let spawned tasks run without advancing the (possibly paused) clock.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ---------------------------------------------------------------------------
// Data builders
// ---------------------------------------------------------------------------

pub fn user(id: &str, username: &str, role: &str) -> UserSummary {
    UserSummary {
        id: id.to_string(),
        username: username.to_string(),
        display_name: None,
        email: None,
        role: role.to_string(),
    }
}

pub fn seeded_notification(id: &str, read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        kind: "case.assigned".to_string(),
        severity: Severity::Medium,
        title: format!("Notification {id}"),
        body: None,
        link: None,
        read,
        read_at: None,
        created_at: DateTime::from_timestamp(1_699_990_000, 0).unwrap(),
    }
}

pub fn push_message(event: &str, body: Value) -> PushMessage {
    let mut data = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.insert("event".to_string(), Value::String(event.to_string()));
    PushMessage {
        id: format!("msg-{event}"),
        timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        data,
    }
}

pub fn notification_message(id: &str) -> PushMessage {
    push_message(
        "notification.created",
        json!({
            "id": id,
            "kind": "case.assigned",
            "severity": "medium",
            "title": "Case assigned",
        }),
    )
}

pub fn alert_message(id: &str, severity: &str) -> PushMessage {
    push_message(
        "alert.created",
        json!({
            "id": id,
            "rule_name": "Suspicious PowerShell",
            "severity": severity,
            "title": "Encoded command observed",
            "source": "sensor-1",
        }),
    )
}

pub fn event_message(id: &str) -> PushMessage {
    push_message(
        "event.created",
        json!({
            "id": id,
            "kind": "process",
            "source": "host-1",
            "message": "process started",
        }),
    )
}
