//! Configuration for the UOF client

use crate::error::{Result, UofError};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

/// Origin used when none is given, matching the backend's default listen port
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Delay between a close and the next reconnect attempt
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Configuration for connecting to a UOF backend
///
/// Can be deserialized from the option names used by browser embeddings
/// (`wsUrl`, `apiUrl`, `autoReconnect`, `reconnectInterval` in milliseconds,
/// plus `origin`). Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ConfigOptions")]
pub struct UofConfig {
    /// Streaming endpoint (e.g., "wss://feed.example.com/ws")
    pub ws_url: String,

    /// Request/response endpoint (e.g., "https://feed.example.com/api")
    pub api_url: String,

    /// Whether to reconnect after the transport closes
    pub auto_reconnect: bool,

    /// Fixed delay before each reconnect attempt
    pub reconnect_interval: Duration,
}

impl UofConfig {
    /// Create a configuration with explicit endpoints
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }

    /// Derive both endpoints from a page/server origin
    ///
    /// A secure origin (`https`) yields a `wss` streaming URL.
    pub fn from_origin(origin: &str) -> Result<Self> {
        let url = Url::parse(origin).map_err(|e| UofError::InvalidUrl(format!("{origin}: {e}")))?;
        let (ws_url, api_url) = endpoints_for(&url)?;
        Ok(Self::new(ws_url, api_url))
    }

    /// Load configuration from `UOF_*` environment variables
    ///
    /// `UOF_ORIGIN` seeds both endpoints, `UOF_WS_URL` / `UOF_API_URL`
    /// override them individually.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("UOF_ORIGIN") {
            Some(origin) => Self::from_origin(&origin)?,
            None => Self::default(),
        };

        if let Some(ws_url) = lookup("UOF_WS_URL") {
            config.ws_url = ws_url;
        }
        if let Some(api_url) = lookup("UOF_API_URL") {
            config.api_url = api_url;
        }
        if let Some(flag) = lookup("UOF_AUTO_RECONNECT") {
            config.auto_reconnect = !matches!(flag.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off");
        }
        if let Some(ms) = lookup("UOF_RECONNECT_INTERVAL_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            if ms > 0 {
                config.reconnect_interval = Duration::from_millis(ms);
            }
        }

        Ok(config)
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Set the delay between a close and the next reconnect attempt
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Override the streaming endpoint
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Override the request/response endpoint
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

impl Default for UofConfig {
    fn default() -> Self {
        Self::new("ws://localhost:8080/ws", "http://localhost:8080/api")
    }
}

fn endpoints_for(origin: &Url) -> Result<(String, String)> {
    let ws_scheme = match origin.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(UofError::InvalidUrl(format!("unsupported scheme: {other}"))),
    };
    let http_scheme = if ws_scheme == "wss" { "https" } else { "http" };

    let host = origin
        .host_str()
        .ok_or_else(|| UofError::InvalidUrl(format!("origin has no host: {origin}")))?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Ok((
        format!("{ws_scheme}://{authority}/ws"),
        format!("{http_scheme}://{authority}/api"),
    ))
}

/// Loosely-typed options as accepted from JSON
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigOptions {
    origin: Option<String>,
    ws_url: Option<String>,
    api_url: Option<String>,
    auto_reconnect: Option<bool>,
    reconnect_interval: Option<u64>,
}

impl TryFrom<ConfigOptions> for UofConfig {
    type Error = UofError;

    fn try_from(opts: ConfigOptions) -> Result<Self> {
        let mut config = match opts.origin.as_deref() {
            Some(origin) => Self::from_origin(origin)?,
            None => Self::default(),
        };

        if let Some(ws_url) = opts.ws_url {
            config.ws_url = ws_url;
        }
        if let Some(api_url) = opts.api_url {
            config.api_url = api_url;
        }
        // Only an explicit `false` turns reconnection off
        config.auto_reconnect = opts.auto_reconnect != Some(false);
        // Zero falls back to the default interval
        if let Some(ms) = opts.reconnect_interval.filter(|ms| *ms > 0) {
            config.reconnect_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_new_defaults() {
        let config = UofConfig::new("ws://feed:9000/ws", "http://feed:9000/api");

        assert_eq!(config.ws_url, "ws://feed:9000/ws");
        assert_eq!(config.api_url, "http://feed:9000/api");
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(3000));
    }

    #[test]
    fn test_config_default_uses_local_backend() {
        let config = UofConfig::default();

        assert_eq!(config.ws_url, "ws://localhost:8080/ws");
        assert_eq!(config.api_url, "http://localhost:8080/api");
        assert_eq!(config, UofConfig::from_origin(DEFAULT_ORIGIN).unwrap());
    }

    #[test]
    fn test_config_from_secure_origin() {
        let config = UofConfig::from_origin("https://odds.example.com").unwrap();

        assert_eq!(config.ws_url, "wss://odds.example.com/ws");
        assert_eq!(config.api_url, "https://odds.example.com/api");
    }

    #[test]
    fn test_config_from_plain_origin_keeps_port() {
        let config = UofConfig::from_origin("http://127.0.0.1:3000/dashboard").unwrap();

        assert_eq!(config.ws_url, "ws://127.0.0.1:3000/ws");
        assert_eq!(config.api_url, "http://127.0.0.1:3000/api");
    }

    #[test]
    fn test_config_from_origin_rejects_garbage() {
        assert!(matches!(
            UofConfig::from_origin("not an origin"),
            Err(UofError::InvalidUrl(_))
        ));
        assert!(matches!(
            UofConfig::from_origin("ftp://example.com"),
            Err(UofError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_config_builder_chain() {
        let config = UofConfig::default()
            .no_reconnect()
            .reconnect_interval(Duration::from_millis(100))
            .ws_url("ws://other/ws")
            .api_url("http://other/api");

        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(100));
        assert_eq!(config.ws_url, "ws://other/ws");
        assert_eq!(config.api_url, "http://other/api");
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("UOF_ORIGIN", "https://feed.example.com"),
            ("UOF_API_URL", "https://api.example.com/v1"),
            ("UOF_AUTO_RECONNECT", "false"),
            ("UOF_RECONNECT_INTERVAL_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config = UofConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.ws_url, "wss://feed.example.com/ws");
        assert_eq!(config.api_url, "https://api.example.com/v1");
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_from_lookup_ignores_bad_interval() {
        let config = UofConfig::from_lookup(|k| {
            (k == "UOF_RECONNECT_INTERVAL_MS").then(|| "soon".to_string())
        })
        .unwrap();

        assert_eq!(config, UofConfig::default());
    }

    #[test]
    fn test_config_deserialize_browser_options() {
        let config: UofConfig = serde_json::from_str(
            r#"{"wsUrl":"ws://x/ws","autoReconnect":false,"reconnectInterval":100,"theme":"dark"}"#,
        )
        .unwrap();

        assert_eq!(config.ws_url, "ws://x/ws");
        assert_eq!(config.api_url, "http://localhost:8080/api");
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_config_deserialize_zero_interval_uses_default() {
        let config: UofConfig =
            serde_json::from_str(r#"{"origin":"https://h","reconnectInterval":0}"#).unwrap();

        assert_eq!(config.ws_url, "wss://h/ws");
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, DEFAULT_RECONNECT_INTERVAL);
    }

    #[test]
    fn test_config_deserialize_bad_origin_fails() {
        let result: std::result::Result<UofConfig, _> = serde_json::from_str(r#"{"origin":"nope"}"#);
        assert!(result.is_err());
    }
}
