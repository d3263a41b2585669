//! Routes decoded push events to the cache reconciliation rules.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::connection::{ConnectionDriver, ConnectionState};
use super::events::{decode_frame, InboundEvent};
use crate::stores::NotificationStore;

/// Single consumer of the driver's inbound stream.
#[derive(Debug, Clone)]
pub struct EventRouter {
    store: Arc<NotificationStore>,
}

impl EventRouter {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self { store }
    }

    /// Apply one event to the cache.
    pub fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::Notification(record) => self.store.insert_notification(record),
            InboundEvent::NotificationRead(receipt) => self.store.apply_read(&receipt),
            InboundEvent::UnreadCountUpdate(count) => self.store.set_unread_count(count),
            InboundEvent::ConnectedAck => tracing::debug!("push channel acknowledged"),
            // Pong replies are the driver's job
            InboundEvent::Ping | InboundEvent::Pong => {}
            InboundEvent::Unknown(_) => {}
        }
    }

    /// Run on its own task until the driver goes away.
    pub fn spawn(self, driver: &ConnectionDriver) -> JoinHandle<()> {
        let frames = driver.subscribe();
        let state = driver.watch_state();
        tokio::spawn(self.run(frames, state))
    }

    pub async fn run(
        self,
        mut frames: broadcast::Receiver<String>,
        mut state: watch::Receiver<ConnectionState>,
    ) {
        let mut was_connected = state.borrow_and_update().is_connected();
        loop {
            tokio::select! {
                // State first: a reconnect must be seen before its frames
                biased;

                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    if current.is_connected() {
                        if was_connected {
                            tracing::info!("push channel reconnected, resynchronising");
                            self.store.invalidate_all();
                        }
                        was_connected = true;
                    }
                }
                frame = frames.recv() => match frame {
                    Ok(text) => self.dispatch(decode_frame(&text)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event router lagged, resynchronising");
                        self.store.invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("event router stopped");
    }
}
