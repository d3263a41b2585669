//! Client configuration from environment variables.

use std::time::Duration;

use bestflow_shared::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, NOTIFICATIONS_WS_PATH};
use url::Url;

use crate::ws::{DriverConfig, ReconnectBudget};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pull API base, e.g. `http://localhost:8000/api/v1`
    pub api_url: Url,
    /// Push endpoint without the token
    pub ws_url: Url,
    pub token: Option<String>,
    pub page_limit: u32,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectBudget,
}

impl ClientConfig {
    /// Environment variables:
    /// - `BESTFLOW_API_URL` (default: "http://localhost:8000/api/v1")
    /// - `BESTFLOW_WS_URL` (default: derived from the API URL)
    /// - `BESTFLOW_TOKEN` (default: none)
    /// - `BESTFLOW_PAGE_LIMIT` (default: 15, clamped to 1..=50)
    /// - `BESTFLOW_CONNECT_TIMEOUT_SECS` (default: 30)
    /// - `BESTFLOW_RECONNECT_BASE_MS` / `BESTFLOW_RECONNECT_MAX_MS` (default: 1000 / 30000)
    /// - `BESTFLOW_RECONNECT_FACTOR` (default: 2.0)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_url = lookup("BESTFLOW_API_URL")
            .unwrap_or_else(|| "http://localhost:8000/api/v1".to_string());
        let api_url = Url::parse(&api_url)
            .map_err(|e| anyhow::anyhow!("BESTFLOW_API_URL is not a valid url: {e}"))?;

        let ws_url = match lookup("BESTFLOW_WS_URL") {
            Some(raw) => {
                Url::parse(&raw).map_err(|e| anyhow::anyhow!("BESTFLOW_WS_URL is not a valid url: {e}"))?
            }
            None => derive_ws_url(&api_url)?,
        };

        let parse_or = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let page_limit = parse_or("BESTFLOW_PAGE_LIMIT", u64::from(DEFAULT_PAGE_LIMIT))
            .clamp(1, u64::from(MAX_PAGE_LIMIT)) as u32;
        let factor = lookup("BESTFLOW_RECONNECT_FACTOR")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(2.0);

        Ok(Self {
            api_url,
            ws_url,
            token: lookup("BESTFLOW_TOKEN").filter(|t| !t.trim().is_empty()),
            page_limit,
            connect_timeout: Duration::from_secs(parse_or("BESTFLOW_CONNECT_TIMEOUT_SECS", 30)),
            reconnect: ReconnectBudget::new(
                Duration::from_millis(parse_or("BESTFLOW_RECONNECT_BASE_MS", 1000)),
                Duration::from_millis(parse_or("BESTFLOW_RECONNECT_MAX_MS", 30_000)),
                factor,
            ),
        })
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            connect_timeout: self.connect_timeout,
            reconnect: self.reconnect.clone(),
            ..DriverConfig::default()
        }
    }
}

/// `http(s)://host/api/v1` → `ws(s)://host/api/v1/ws/notifications`
fn derive_ws_url(api_url: &Url) -> anyhow::Result<Url> {
    let scheme = match api_url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    let host = api_url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("BESTFLOW_API_URL has no host"))?;
    let port = api_url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let raw = format!("{scheme}://{host}{port}{NOTIFICATIONS_WS_PATH}");
    Url::parse(&raw).map_err(|e| anyhow::anyhow!("derived push url is invalid: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.api_url.as_str(), "http://localhost:8000/api/v1");
        assert_eq!(c.ws_url.as_str(), "ws://localhost:8000/api/v1/ws/notifications");
        assert_eq!(c.page_limit, 15);
        assert_eq!(c.connect_timeout, Duration::from_secs(30));
        assert_eq!(c.reconnect, ReconnectBudget::default());
        assert_eq!(c.token, None);
    }

    #[test]
    fn https_api_derives_wss() {
        let c = config(&[("BESTFLOW_API_URL", "https://portal.example.com/api/v1")]);
        assert_eq!(c.ws_url.as_str(), "wss://portal.example.com/api/v1/ws/notifications");
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(config(&[("BESTFLOW_PAGE_LIMIT", "500")]).page_limit, 50);
        assert_eq!(config(&[("BESTFLOW_PAGE_LIMIT", "0")]).page_limit, 1);
        assert_eq!(config(&[("BESTFLOW_PAGE_LIMIT", "nope")]).page_limit, 15);
    }
}
