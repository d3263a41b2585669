//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::SessionRegistry;
use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::store::NotificationStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub hub: Arc<Hub>,
    pub store: Arc<NotificationStore>,
    pub ping_interval: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::from_dev_users(&config.dev_users)),
            hub: Arc::new(Hub::new()),
            store: Arc::new(NotificationStore::new()),
            ping_interval: config.ping_interval,
        }
    }
}
