//! Push channel connection: state, endpoint and the driver that owns the socket.

use std::fmt;

use bestflow_shared::TOKEN_QUERY_PARAM;
use url::Url;

mod driver;

pub use driver::{ConnectionDriver, DriverConfig};

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt timed out or could not open the transport. A
    /// scheduled retry waits in this state and moves straight to
    /// `Connecting` when it fires.
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push service address with the bearer token embedded as a query parameter.
///
/// `Debug` and `Display` never print the token.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    url: Url,
}

impl ChannelEndpoint {
    /// Build the endpoint for a token. Any token already on `base` is replaced.
    pub fn derive(base: &Url, token: &str) -> Self {
        let mut url = base.clone();
        let kept: Vec<(String, String)> = base
            .query_pairs()
            .filter(|(k, _)| &**k != TOKEN_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(TOKEN_QUERY_PARAM, token);
        Self { url }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host and path, for log lines.
    pub fn display_target(&self) -> String {
        format!(
            "{}{}",
            self.url.host_str().unwrap_or_default(),
            self.url.path()
        )
    }
}

impl fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("target", &self.display_target())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_target())
    }
}
