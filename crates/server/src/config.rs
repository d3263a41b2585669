//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use bestflow_shared::UserRole;

/// A pre-issued session, used in place of a real identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevUser {
    pub token: String,
    pub user_id: String,
    pub role: UserRole,
}

impl DevUser {
    /// Parse `token:user_id:role`.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().splitn(3, ':');
        let token = parts.next()?.trim();
        let user_id = parts.next()?.trim();
        let role = UserRole::parse(parts.next()?.trim())?;
        if token.is_empty() || user_id.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            user_id: user_id.to_string(),
            role,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Inbound silence on a push connection before the server pings
    pub ping_interval: Duration,
    pub dev_users: Vec<DevUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            ping_interval: Duration::from_secs(30),
            dev_users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BESTFLOW_BIND`: listen address (default: "0.0.0.0:8000")
    /// - `BESTFLOW_PING_INTERVAL_SECS`: idle seconds before a ping (default: 30)
    /// - `BESTFLOW_DEV_USERS`: comma separated `token:user_id:role` entries
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind = match std::env::var("BESTFLOW_BIND") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("BESTFLOW_BIND is not a socket address: {e}"))?,
            Err(_) => defaults.bind,
        };

        let ping_interval = std::env::var("BESTFLOW_PING_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.ping_interval);

        let dev_users = std::env::var("BESTFLOW_DEV_USERS")
            .map(|raw| parse_dev_users(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind,
            ping_interval,
            dev_users,
        })
    }
}

fn parse_dev_users(raw: &str) -> Vec<DevUser> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let user = DevUser::parse(entry);
            if user.is_none() {
                tracing::warn!(entry, "ignoring malformed BESTFLOW_DEV_USERS entry");
            }
            user
        })
        .collect()
}
