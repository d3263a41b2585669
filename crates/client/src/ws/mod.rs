//! Push channel for real-time notifications.
//!
//! This module provides:
//! - A connection driver with connect timeout and exponential backoff
//! - Decoding of inbound frames into typed events
//! - A router applying those events to the notification cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐   credential    ┌──────────────────────┐
//! │   SessionBinding    │ ──────────────▶ │   ConnectionDriver   │
//! │ (derives endpoint)  │                 │ (socket, timers,     │
//! └─────────────────────┘                 │  ping → pong)        │
//!                                         └──────────────────────┘
//!                                                    │ raw frames
//!                                                    ▼
//!                                         ┌──────────────────────┐
//!                                         │     EventRouter      │
//!                                         │ (decode + dispatch)  │
//!                                         └──────────────────────┘
//!                                                    │
//!                                                    ▼
//!                                         ┌──────────────────────┐
//!                                         │  NotificationStore   │
//!                                         │ (insert / invalidate │
//!                                         │  / direct-set)       │
//!                                         └──────────────────────┘
//!                                                    │
//!                                   ┌────────────────┼────────────────┐
//!                                   ▼                ▼                ▼
//!                              bell badge      notification      any other
//!                                               list view          reader
//! ```
//!
//! # Usage
//!
//! Consumers read from the store's query cells, never from the socket.
//!
//! ```rust,ignore
//! let driver = ConnectionDriver::new(Arc::new(TungsteniteConnector), DriverConfig::default());
//! EventRouter::new(store.clone()).spawn(&driver);
//! driver.connect(Some(endpoint));
//!
//! let mut unread = store.watch_unread();
//! while unread.changed().await.is_ok() {
//!     println!("unread: {:?}", unread.borrow().data);
//! }
//! ```

pub mod backoff;
mod connection;
pub mod events;
mod router;
pub mod transport;

pub use backoff::ReconnectBudget;
pub use connection::{ChannelEndpoint, ConnectionDriver, ConnectionState, DriverConfig};
pub use events::{decode_frame, InboundEvent};
pub use router::EventRouter;
pub use transport::{Connector, TransportError, TransportLink, TransportMessage, TungsteniteConnector};
