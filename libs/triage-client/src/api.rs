//! The remote Triage API, behind a trait so tests can script it.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::ClientError;
use crate::models::{
    DashboardStats, HeatmapCell, NotificationFilters, NotificationPage, SeverityBucket,
    TimeRange, TimelineBucket, TimelineInterval, TokenGrant, TopRule, UserSummary,
};

/// Everything the client core asks of the server.
///
/// Backed by HTTP in production and a scripted mock in tests. The bearer
/// token travels through `set_bearer`; the stores never see it.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// Install (or drop) the Authorization bearer used by subsequent calls.
    fn set_bearer(&self, token: Option<String>);

    // -- auth ---------------------------------------------------------------

    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, ClientError>;
    async fn me(&self) -> Result<UserSummary, ClientError>;
    async fn refresh(&self) -> Result<TokenGrant, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;

    // -- notifications ------------------------------------------------------

    async fn list_notifications(
        &self,
        page: u32,
        page_size: u32,
        filters: &NotificationFilters,
    ) -> Result<NotificationPage, ClientError>;
    async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError>;
    async fn mark_notifications_read(&self, ids: &[String]) -> Result<(), ClientError>;
    async fn mark_all_notifications_read(&self) -> Result<(), ClientError>;
    async fn delete_notification(&self, id: &str) -> Result<(), ClientError>;
    async fn unread_count(&self) -> Result<u64, ClientError>;

    // -- dashboard ----------------------------------------------------------

    async fn stats(&self, range: TimeRange) -> Result<DashboardStats, ClientError>;
    async fn timeline(
        &self,
        range: TimeRange,
        interval: TimelineInterval,
    ) -> Result<Vec<TimelineBucket>, ClientError>;
    async fn top_rules(&self, range: TimeRange) -> Result<Vec<TopRule>, ClientError>;
    async fn severity_breakdown(&self, range: TimeRange)
        -> Result<Vec<SeverityBucket>, ClientError>;
    async fn technique_heatmap(&self, range: TimeRange) -> Result<Vec<HeatmapCell>, ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UnreadCountBody {
    unread_count: u64,
}

pub struct HttpApi {
    base_url: String,
    http: reqwest::Client,
    bearer: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            bearer: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map a non-2xx response to a typed error, consuming the body for the message.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };
        if status == StatusCode::UNAUTHORIZED {
            Err(ClientError::unauthorized(message))
        } else {
            Err(ClientError::api(status.as_u16(), message))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let response = self
            .authed(self.http.get(self.url(path)))
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_empty(&self, path: &str) -> Result<(), ClientError> {
        let response = self.authed(self.http.post(self.url(path))).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    fn range_query(range: TimeRange) -> Vec<(&'static str, String)> {
        vec![("range", range.as_query_str().to_string())]
    }
}

#[async_trait]
impl ConsoleApi for HttpApi {
    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write() = token;
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::credentials("Invalid username or password"));
        }
        Ok(Self::check(response).await?.json().await?)
    }

    async fn me(&self) -> Result<UserSummary, ClientError> {
        self.get_json("/auth/me", &[]).await
    }

    async fn refresh(&self) -> Result<TokenGrant, ClientError> {
        let response = self
            .authed(self.http.post(self.url("/auth/refresh")))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.post_empty("/auth/logout").await
    }

    async fn list_notifications(
        &self,
        page: u32,
        page_size: u32,
        filters: &NotificationFilters,
    ) -> Result<NotificationPage, ClientError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        query.extend(filters.query_pairs());
        self.get_json("/notifications", &query).await
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError> {
        self.post_empty(&format!("/notifications/{id}/read")).await
    }

    async fn mark_notifications_read(&self, ids: &[String]) -> Result<(), ClientError> {
        let response = self
            .authed(self.http.post(self.url("/notifications/read")))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ClientError> {
        self.post_empty("/notifications/read-all").await
    }

    async fn delete_notification(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .authed(self.http.delete(self.url(&format!("/notifications/{id}"))))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64, ClientError> {
        let body: UnreadCountBody = self.get_json("/notifications/unread-count", &[]).await?;
        Ok(body.unread_count)
    }

    async fn stats(&self, range: TimeRange) -> Result<DashboardStats, ClientError> {
        self.get_json("/realtime/stats", &Self::range_query(range))
            .await
    }

    async fn timeline(
        &self,
        range: TimeRange,
        interval: TimelineInterval,
    ) -> Result<Vec<TimelineBucket>, ClientError> {
        let mut query = Self::range_query(range);
        query.push(("interval", interval.as_query_str().to_string()));
        self.get_json("/realtime/timeline", &query).await
    }

    async fn top_rules(&self, range: TimeRange) -> Result<Vec<TopRule>, ClientError> {
        self.get_json("/realtime/top-rules", &Self::range_query(range))
            .await
    }

    async fn severity_breakdown(
        &self,
        range: TimeRange,
    ) -> Result<Vec<SeverityBucket>, ClientError> {
        self.get_json("/realtime/severity", &Self::range_query(range))
            .await
    }

    async fn technique_heatmap(&self, range: TimeRange) -> Result<Vec<HeatmapCell>, ClientError> {
        self.get_json("/realtime/heatmap", &Self::range_query(range))
            .await
    }
}
