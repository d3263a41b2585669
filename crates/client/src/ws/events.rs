//! Typed view of inbound push frames.

use bestflow_shared::{
    NotificationRecord, RawFrame, ReadReceipt, UnreadCountPayload, FRAME_CONNECTED,
    FRAME_NOTIFICATION, FRAME_NOTIFICATION_READ, FRAME_PING, FRAME_PONG, FRAME_UNREAD_COUNT,
};

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Notification(NotificationRecord),
    NotificationRead(ReadReceipt),
    UnreadCountUpdate(u64),
    ConnectedAck,
    Ping,
    Pong,
    /// Anything that failed validation, kept verbatim for logging.
    Unknown(String),
}

impl InboundEvent {
    pub fn is_unknown(&self) -> bool {
        matches!(self, InboundEvent::Unknown(_))
    }
}

/// Decode one text frame. Never fails: bad input becomes `Unknown`.
pub fn decode_frame(text: &str) -> InboundEvent {
    let frame = match RawFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed push frame");
            return InboundEvent::Unknown(text.to_string());
        }
    };

    let decoded = match frame.frame_type.as_str() {
        FRAME_NOTIFICATION => frame
            .data
            .ok_or_else(|| "missing data".to_string())
            .and_then(|data| {
                serde_json::from_value::<NotificationRecord>(data).map_err(|e| e.to_string())
            })
            .map(InboundEvent::Notification),
        // A bare notification_read means "something changed"; treat it as bulk.
        FRAME_NOTIFICATION_READ => match frame.data {
            None | Some(serde_json::Value::Null) => Ok(InboundEvent::NotificationRead(ReadReceipt::all())),
            Some(data) => serde_json::from_value::<ReadReceipt>(data)
                .map(InboundEvent::NotificationRead)
                .map_err(|e| e.to_string()),
        },
        FRAME_UNREAD_COUNT => frame
            .data
            .ok_or_else(|| "missing data".to_string())
            .and_then(|data| {
                serde_json::from_value::<UnreadCountPayload>(data).map_err(|e| e.to_string())
            })
            .map(|payload| InboundEvent::UnreadCountUpdate(payload.count)),
        FRAME_CONNECTED => Ok(InboundEvent::ConnectedAck),
        FRAME_PING => Ok(InboundEvent::Ping),
        FRAME_PONG => Ok(InboundEvent::Pong),
        other => Err(format!("unknown frame type {other:?}")),
    };

    decoded.unwrap_or_else(|reason| {
        tracing::warn!(frame_type = %frame.frame_type, %reason, "dropping push frame");
        InboundEvent::Unknown(text.to_string())
    })
}
