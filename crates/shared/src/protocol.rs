//! Push channel wire protocol.
//!
//! Every text frame is a JSON object of the shape
//! `{ "type": string, "data"?: object, "timestamp"?: string }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::NotificationRecord;

/// Path of the push endpoint, relative to the service origin.
pub const NOTIFICATIONS_WS_PATH: &str = "/api/v1/ws/notifications";
/// Query parameter carrying the bearer token on the push endpoint.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Frame discriminants understood by both ends.
pub const FRAME_NOTIFICATION: &str = "notification";
pub const FRAME_NOTIFICATION_READ: &str = "notification_read";
pub const FRAME_UNREAD_COUNT: &str = "unread_count";
pub const FRAME_CONNECTED: &str = "connected";
pub const FRAME_PING: &str = "ping";
pub const FRAME_PONG: &str = "pong";

/// Structural view of an inbound frame, before its payload is interpreted.
///
/// Only `type` is required; anything else the sender adds is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RawFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events the server pushes to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Notification(NotificationRecord),
    NotificationRead(ReadReceipt),
    UnreadCount(UnreadCountPayload),
    Connected(ConnectedInfo),
    Ping,
    Pong,
}

impl ServerEvent {
    pub fn frame_type(&self) -> &'static str {
        match self {
            ServerEvent::Notification(_) => FRAME_NOTIFICATION,
            ServerEvent::NotificationRead(_) => FRAME_NOTIFICATION_READ,
            ServerEvent::UnreadCount(_) => FRAME_UNREAD_COUNT,
            ServerEvent::Connected(_) => FRAME_CONNECTED,
            ServerEvent::Ping => FRAME_PING,
            ServerEvent::Pong => FRAME_PONG,
        }
    }
}

/// Payload of `notification_read`: a single id, or everything when `all` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub all: bool,
}

impl ReadReceipt {
    pub fn one(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            all: false,
        }
    }

    pub fn all() -> Self {
        Self { id: None, all: true }
    }
}

/// Payload of `unread_count`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCountPayload {
    #[serde(alias = "unread_count")]
    pub count: u64,
}

/// Payload of `connected`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectedInfo {
    pub message: String,
}

/// A server event stamped with its send time, ready for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct PushFrame {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PushFrame {
    pub fn now(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frames a client sends up the channel. Only liveness traffic flows this way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Pong,
}

impl ClientFrame {
    pub fn to_json(&self) -> String {
        match self {
            ClientFrame::Ping => format!(r#"{{"type":"{FRAME_PING}"}}"#),
            ClientFrame::Pong => format!(r#"{{"type":"{FRAME_PONG}"}}"#),
        }
    }
}
