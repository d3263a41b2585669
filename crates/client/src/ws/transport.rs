//! Message transport underneath the connection driver.
//!
//! A [`Connector`] opens a [`TransportLink`]: a pair of channels carrying text
//! frames in each direction. Dropping the link's outbound sender closes the
//! socket. The production connector pumps a tokio-tungstenite stream into
//! those channels.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Transport-level failures. All of them are recovered by the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid push channel url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Something that arrived from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    /// The socket is gone. Always the last message of a link.
    Closed { code: Option<u16>, reason: String },
}

/// An open, full-duplex text channel.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<TransportMessage>,
}

impl TransportLink {
    pub fn new(
        outbound: UnboundedSender<String>,
        inbound: UnboundedReceiver<TransportMessage>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens transport links to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError>;
}

/// WebSocket connector built on tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl(redact_token(url)));
        }

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = unbounded_channel::<TransportMessage>();

        // Read pump
        let inbound_for_read = inbound_tx.clone();
        tokio::spawn(async move {
            let closed = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_for_read
                            .send(TransportMessage::Text(text.as_str().to_string()))
                            .is_err()
                        {
                            // Link dropped by the driver
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportMessage::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_string(),
                            },
                            None => TransportMessage::Closed {
                                code: None,
                                reason: "close frame".to_string(),
                            },
                        };
                    }
                    Some(Ok(_)) => {
                        // Binary and protocol-level ping/pong frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        break TransportMessage::Closed {
                            code: None,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break TransportMessage::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };
            let _ = inbound_for_read.send(closed);
        });

        // Write pump
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "push channel write failed");
                    let _ = inbound_tx.send(TransportMessage::Closed {
                        code: None,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
            // Outbound sender dropped: the driver closed the link
            let _ = write.send(Message::Close(None)).await;
            let _ = write.close().await;
        });

        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}

/// Strip the token query parameter from a URL before it reaches a log line.
pub fn redact_token(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if k == bestflow_shared::TOKEN_QUERY_PARAM {
                        "***".to_string()
                    } else {
                        v.into_owned()
                    };
                    (k.into_owned(), v)
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}
