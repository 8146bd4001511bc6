/// Client core configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The Triage API origin (e.g. `https://triage.example.com/api`).
    pub base_url: String,
    /// How long before token expiry the proactive refresh fires (seconds).
    pub refresh_lead_secs: i64,
    /// Fallback unread-count poll period for the notification store (seconds).
    pub notification_poll_secs: u64,
    /// Default stats re-pull period for the dashboard store (milliseconds).
    pub dashboard_poll_ms: u64,
}

impl ClientConfig {
    /// Build a configuration with the stock intervals.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_lead_secs: 300,
            notification_poll_secs: 60,
            dashboard_poll_ms: 30_000,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if `TRIAGE_API_URL` is missing.
    pub fn from_env() -> Self {
        let mut config = Self::new(required_var("TRIAGE_API_URL"));
        if let Some(v) = parsed_var("TRIAGE_REFRESH_LEAD_SECS") {
            config.refresh_lead_secs = v;
        }
        if let Some(v) = parsed_var("TRIAGE_NOTIFICATION_POLL_SECS") {
            config.notification_poll_secs = v;
        }
        if let Some(v) = parsed_var("TRIAGE_DASHBOARD_POLL_MS") {
            config.dashboard_poll_ms = v;
        }
        config
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
