//! End-to-end wiring: auth events drive store lifecycle, push messages flow
//! through the hub, and logout leaves nothing running.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::advance;

use common::{alert_message, config, event_message, init_tracing, notification_message, settle, MockApi};
use triage_client::api::ConsoleApi;
use triage_client::clock::ManualClock;
use triage_client::credentials::MemoryCredentialStore;
use triage_client::push::{PushHub, Topic};
use triage_client::Services;

fn services_fixture() -> (Arc<Services>, Arc<MockApi>, Arc<ManualClock>) {
    init_tracing();
    let api = Arc::new(MockApi::new());
    let clock = Arc::new(ManualClock::new());
    let services = Services::new(
        config(),
        api.clone() as Arc<dyn ConsoleApi>,
        Arc::new(MemoryCredentialStore::new()),
        clock.clone(),
    );
    (services, api, clock)
}

#[tokio::test(start_paused = true)]
async fn login_starts_polling_in_both_stores() {
    let (services, api, _clock) = services_fixture();
    services.session.login("alice", "x").await.expect("login");
    settle().await;

    // Notification poll is 60s, dashboard poll 30s.
    advance(Duration::from_secs(61)).await;
    settle().await;
    assert!(api.unread_calls.load(Ordering::SeqCst) >= 1);
    assert!(api.stats_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn push_messages_flow_through_the_hub() {
    let (services, _api, _clock) = services_fixture();
    let hub = PushHub::new();
    services.connect_push(&hub);
    services.session.login("alice", "x").await.expect("login");
    settle().await;

    hub.publish(Topic::NOTIFICATIONS, notification_message("n1"));
    hub.publish(Topic::DASHBOARD_ALERTS, alert_message("a1", "critical"));
    settle().await;

    assert_eq!(services.notifications.unread_count(), 1);
    assert_eq!(services.dashboard.live_alerts().len(), 1);
    assert_eq!(services.dashboard.stats().alerts.critical, 1);
}

#[tokio::test(start_paused = true)]
async fn push_is_dropped_while_logged_out() {
    let (services, _api, _clock) = services_fixture();
    let hub = PushHub::new();
    services.connect_push(&hub);

    hub.publish(Topic::DASHBOARD_ALERTS, alert_message("a1", "high"));
    settle().await;
    assert!(services.dashboard.live_alerts().is_empty());

    services.session.login("alice", "x").await.expect("login");
    settle().await;
    hub.publish(Topic::DASHBOARD_ALERTS, alert_message("a2", "high"));
    settle().await;
    assert_eq!(services.dashboard.live_alerts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_clears_stores_and_silences_the_network() {
    let (services, api, _clock) = services_fixture();
    let hub = PushHub::new();
    services.connect_push(&hub);
    services.session.login("alice", "x").await.expect("login");
    settle().await;

    hub.publish(Topic::NOTIFICATIONS, notification_message("n1"));
    hub.publish(Topic::DASHBOARD_EVENTS, event_message("e1"));
    settle().await;
    assert_eq!(services.notifications.unread_count(), 1);
    assert_eq!(services.dashboard.live_events().len(), 1);

    services.session.logout().await;
    settle().await;

    assert!(!services.session.is_authenticated());
    assert_eq!(services.notifications.unread_count(), 0);
    assert!(services.notifications.snapshot().is_empty());
    assert!(services.dashboard.live_events().is_empty());
    assert_eq!(services.dashboard.stats().events, 0);

    // Nothing may fire after logout: no poll, no proactive refresh.
    let unread_before = api.unread_calls.load(Ordering::SeqCst);
    let stats_before = api.stats_calls.load(Ordering::SeqCst);
    advance(Duration::from_secs(7200)).await;
    settle().await;
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.unread_calls.load(Ordering::SeqCst), unread_before);
    assert_eq!(api.stats_calls.load(Ordering::SeqCst), stats_before);

    // A late push against the dead session is dropped too.
    hub.publish(Topic::NOTIFICATIONS, notification_message("n2"));
    settle().await;
    assert_eq!(services.notifications.unread_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_halts_background_work_without_logging_out() {
    let (services, api, _clock) = services_fixture();
    services.session.login("alice", "x").await.expect("login");
    settle().await;

    services.teardown();
    advance(Duration::from_secs(7200)).await;
    settle().await;

    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.unread_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.stats_calls.load(Ordering::SeqCst), 0);
    // The session itself survives for a later restore.
    assert!(services.session.is_authenticated());
}
