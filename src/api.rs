//! Read-only query accessors for the UOF backend's HTTP API
//!
//! Each call is a single GET with no retry or caching. A non-success status
//! becomes [`UofError::Http`] carrying the status code and reason phrase.

use crate::error::{Result, UofError};

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A feed message as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub message_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub sport_id: Option<String>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub xml_content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response of `GET /messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// An event (match) the backend is tracking
///
/// Fields beyond the common ones vary between backend versions and are kept
/// in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub event_id: String,
    #[serde(default)]
    pub sport_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `GET /events`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvents {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<TrackedEvent>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Response of `GET /events/{event_id}/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessages {
    pub event_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<StoredMessage>,
}

/// Response of `GET /stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub odds_changes: u64,
    #[serde(default)]
    pub bet_stops: u64,
    #[serde(default)]
    pub bet_settlements: u64,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub time: Option<i64>,
}

/// Common filters for `GET /messages`
///
/// Any other `Serialize` value (e.g. `&[("limit", "10")]`) works too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// Stateless client for the backend's JSON API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g. "https://host/api")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client that reuses an existing `reqwest::Client`
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List stored messages, newest first
    pub async fn get_messages<Q>(&self, params: &Q) -> Result<MessagePage>
    where
        Q: Serialize + ?Sized,
    {
        self.get_json(&["messages"], Some(params)).await
    }

    /// List events the backend is tracking
    pub async fn get_tracked_events(&self) -> Result<TrackedEvents> {
        self.get_json::<_, ()>(&["events"], None).await
    }

    /// List stored messages for one event, oldest first
    pub async fn get_event_messages(&self, event_id: &str) -> Result<EventMessages> {
        self.get_json::<_, ()>(&["events", event_id, "messages"], None)
            .await
    }

    /// Fetch aggregate counters
    pub async fn get_stats(&self) -> Result<FeedStats> {
        self.get_json::<_, ()>(&["stats"], None).await
    }

    /// Probe backend liveness
    pub async fn health(&self) -> Result<Health> {
        self.get_json::<_, ()>(&["health"], None).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| UofError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| UofError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T, Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let mut request = self.http.get(url);
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "API response");

        if !status.is_success() {
            return Err(http_error(status));
        }

        Ok(response.json().await?)
    }
}

fn http_error(status: StatusCode) -> UofError {
    UofError::Http {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

/// The backend encodes empty result sets as `null`
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let api = ApiClient::new("http://localhost:8080/api");
        assert_eq!(
            api.endpoint(&["stats"]).unwrap().as_str(),
            "http://localhost:8080/api/stats"
        );
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let api = ApiClient::new("http://localhost:8080/api/");
        assert_eq!(
            api.endpoint(&["events"]).unwrap().as_str(),
            "http://localhost:8080/api/events"
        );
    }

    #[test]
    fn test_endpoint_encodes_event_id() {
        let api = ApiClient::new("https://feed.example.com/api");
        assert_eq!(
            api.endpoint(&["events", "sr:match:1/2", "messages"]).unwrap().as_str(),
            "https://feed.example.com/api/events/sr:match:1%2F2/messages"
        );
    }

    #[test]
    fn test_endpoint_invalid_base() {
        let api = ApiClient::new("not a url");
        assert!(matches!(api.endpoint(&["stats"]), Err(UofError::InvalidUrl(_))));
    }

    #[test]
    fn test_http_error_reason() {
        let err = http_error(StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_message_query_serialization() {
        let query = MessageQuery::new().limit(10).message_type("odds_change");
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value, serde_json::json!({"limit": 10, "message_type": "odds_change"}));
    }

    #[test]
    fn test_message_page_null_messages() {
        let page: MessagePage =
            serde_json::from_str(r#"{"messages":null,"limit":50,"offset":0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert_eq!(page.limit, Some(50));
    }

    #[test]
    fn test_stored_message_decodes_go_timestamps() {
        let msg: StoredMessage = serde_json::from_str(
            r#"{"id":7,"message_type":"bet_stop","event_id":"sr:match:3","routing_key":"rk","xml_content":"<bet_stop/>","received_at":"2024-05-01T10:00:00.123456+08:00"}"#,
        )
        .unwrap();

        assert_eq!(msg.id, 7);
        assert_eq!(msg.event_id.as_deref(), Some("sr:match:3"));
        assert_eq!(
            msg.received_at.unwrap().to_rfc3339(),
            "2024-05-01T02:00:00.123456+00:00"
        );
        assert!(msg.created_at.is_none());
    }

    #[test]
    fn test_tracked_event_keeps_extra_fields() {
        let events: TrackedEvents = serde_json::from_str(
            r#"{"success":true,"count":1,"events":[{"event_id":"sr:match:9","status":"active","message_count":12,"home_team_name":"Home"}]}"#,
        )
        .unwrap();

        assert_eq!(events.count, Some(1));
        let event = &events.events[0];
        assert_eq!(event.message_count, 12);
        assert!(!event.subscribed);
        assert_eq!(event.extra.get("home_team_name"), Some(&Value::from("Home")));
    }
}
