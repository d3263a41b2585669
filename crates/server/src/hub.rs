//! Per-user registry of open push connections and the fan-out over them.
//!
//! Each connection is represented by the sending half of its outbound queue.
//! A send that fails means the socket task is gone; that connection is
//! dropped on the spot.

use std::collections::HashMap;

use bestflow_shared::{PushFrame, ServerEvent};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection whose socket task drains `tx`'s queue.
    pub async fn attach(&self, user_id: &str, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let conn_id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        let user_connections = connections.entry(user_id.to_string()).or_default();
        user_connections.insert(conn_id, tx);
        tracing::info!(user_id, %conn_id, open = user_connections.len(), "push connection registered");
        conn_id
    }

    /// Track a new connection. Returns its id and the queue to drain.
    pub async fn register(&self, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.attach(user_id, tx).await, rx)
    }

    /// Forget a connection. Returns true if it was the user's last one.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        if let Some(user_connections) = connections.get_mut(user_id) {
            user_connections.remove(&conn_id);
            if user_connections.is_empty() {
                connections.remove(user_id);
                return true;
            }
        }
        false
    }

    /// Push an event to every connection of one user. Returns how many took it.
    pub async fn send_to_user(&self, user_id: &str, event: ServerEvent) -> usize {
        let Some(json) = encode(event) else {
            return 0;
        };
        let mut connections = self.connections.write().await;
        let Some(user_connections) = connections.get_mut(user_id) else {
            return 0;
        };
        user_connections.retain(|conn_id, tx| {
            let alive = tx.send(json.clone()).is_ok();
            if !alive {
                tracing::debug!(user_id, %conn_id, "dropping dead push connection");
            }
            alive
        });
        let delivered = user_connections.len();
        if user_connections.is_empty() {
            connections.remove(user_id);
        }
        delivered
    }

    /// Push an event to every connected user except `exclude`.
    pub async fn broadcast(&self, event: ServerEvent, exclude: Option<&str>) -> usize {
        let Some(json) = encode(event) else {
            return 0;
        };
        let mut connections = self.connections.write().await;
        let mut delivered = 0;
        for (user_id, user_connections) in connections.iter_mut() {
            if exclude == Some(user_id.as_str()) {
                continue;
            }
            user_connections.retain(|_, tx| tx.send(json.clone()).is_ok());
            delivered += user_connections.len();
        }
        connections.retain(|_, user_connections| !user_connections.is_empty());
        delivered
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.connections
            .read()
            .await
            .get(user_id)
            .is_some_and(|c| !c.is_empty())
    }

    pub async fn connected_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.read().await.keys().cloned().collect();
        users.sort();
        users
    }
}

fn encode(event: ServerEvent) -> Option<String> {
    let frame_type = event.frame_type();
    match PushFrame::now(event).to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(frame_type, error = %e, "failed to encode push frame");
            None
        }
    }
}
