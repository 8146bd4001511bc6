//! Wire and domain types shared by the session manager and the state stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// The signed-in user as reported by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

impl UserSummary {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// A token issued by login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    #[serde(alias = "access_token")]
    pub token: String,
    /// Lifetime of the token in seconds from the moment it was granted.
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One page of pulled notifications plus the server-side counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: u64,
    pub unread_count: u64,
}

/// Server-side filters for the notification list pull.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilters {
    pub unread_only: Option<bool>,
    pub kind: Option<String>,
    pub severity: Option<Severity>,
}

impl NotificationFilters {
    /// Render the filters as query pairs, skipping unset fields.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(unread_only) = self.unread_only {
            pairs.push(("unread_only", unread_only.to_string()));
        }
        if let Some(kind) = &self.kind {
            pairs.push(("kind", kind.clone()));
        }
        if let Some(severity) = self.severity {
            pairs.push(("severity", severity.as_str().to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Dashboard query parameters
// ---------------------------------------------------------------------------

/// Selectable window for every `/realtime/...` pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn as_query_str(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }
}

/// Bucket width for the event timeline pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineInterval {
    Minute,
    #[default]
    Hour,
    Day,
}

impl TimelineInterval {
    pub fn as_query_str(&self) -> &'static str {
        match self {
            TimelineInterval::Minute => "minute",
            TimelineInterval::Hour => "hour",
            TimelineInterval::Day => "day",
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard slices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: u64,
    pub open: u64,
    pub critical: u64,
    pub high: u64,
}

/// The aggregate counters shown at the top of the dashboard. Replaced
/// wholesale by pulls, adjusted incrementally by push messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub alerts: AlertCounts,
    pub cases: u64,
    pub rules: u64,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub ts: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRule {
    pub rule_id: String,
    pub name: String,
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBucket {
    pub severity: Severity,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub technique_id: String,
    #[serde(default)]
    pub tactic: Option<String>,
    pub count: u64,
}

/// Push-delivered alert kept in the bounded live buffer. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAlert {
    pub id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub title: String,
    pub source: String,
    pub received_at: DateTime<Utc>,
}

/// Push-delivered raw event kept in the bounded live buffer. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub id: String,
    pub kind: String,
    pub source: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}
