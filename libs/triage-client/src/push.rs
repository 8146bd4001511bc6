//! Types consumed from the push channel, and the in-process fan-out hub.
//!
//! The channel transport itself (WebSocket, SSE, ...) is an external
//! collaborator: whatever drives it publishes each inbound message into a
//! [`PushHub`] under its topic, and the stores consume from there.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Capacity of the fan-out channel. A consumer that falls behind skips
/// messages (RecvError::Lagged); the polling fallback self-heals afterwards.
const HUB_CAPACITY: usize = 1024;

/// Topics the core subscribes to.
pub struct Topic;

impl Topic {
    pub const NOTIFICATIONS: &'static str = "notifications";
    pub const DASHBOARD_ALERTS: &'static str = "dashboard:alerts";
    pub const DASHBOARD_EVENTS: &'static str = "dashboard:events";
    pub const DASHBOARD_STATS: &'static str = "dashboard:stats";
    pub const DASHBOARD_DETECTIONS: &'static str = "dashboard:detections";

    /// Every topic the core wants a subscription for.
    pub const ALL: [&'static str; 5] = [
        Self::NOTIFICATIONS,
        Self::DASHBOARD_ALERTS,
        Self::DASHBOARD_EVENTS,
        Self::DASHBOARD_STATS,
        Self::DASHBOARD_DETECTIONS,
    ];
}

/// One server-initiated message: `{id, timestamp, data}`, dispatched by the
/// implicit `event` field inside `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl PushMessage {
    /// The event name carried inside `data`, e.g. `alert.created`.
    pub fn event(&self) -> Option<&str> {
        self.data.get("event").and_then(Value::as_str)
    }

    /// The data map as a `Value` for typed deserialization. Unknown fields
    /// (including `event` itself) are ignored by the payload structs.
    pub fn payload(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// A message tagged with the topic it arrived on.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub topic: String,
    pub message: PushMessage,
}

/// In-process fan-out of push messages. Cloneable; one hub per transport.
#[derive(Clone)]
pub struct PushHub {
    sender: broadcast::Sender<Arc<TopicMessage>>,
}

impl PushHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the full message stream. Consumers filter by topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TopicMessage>> {
        self.sender.subscribe()
    }

    /// Publish an inbound message under its topic.
    pub fn publish(&self, topic: &str, message: PushMessage) {
        // send() errors when nobody is subscribed, which is fine.
        let _ = self.sender.send(Arc::new(TopicMessage {
            topic: topic.to_string(),
            message,
        }));
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}
