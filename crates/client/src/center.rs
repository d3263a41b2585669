//! The notification center: everything a presentation layer needs, wired up.

use std::sync::Arc;

use bestflow_shared::{ApiError, MarkAllReadResponse, NotificationPage, NotificationRecord};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::api_client::{ApiClient, NotificationApi};
use crate::auth_session::{Credential, SessionBinding, SessionChange};
use crate::config::ClientConfig;
use crate::stores::{NotificationStore, QuerySnapshot};
use crate::ws::{ConnectionDriver, ConnectionState, Connector, DriverConfig, EventRouter, TungsteniteConnector};

pub struct NotificationCenter {
    session: SessionBinding,
    store: Arc<NotificationStore>,
    router: JoinHandle<()>,
}

impl NotificationCenter {
    /// Production wiring: HTTP pull API and a WebSocket push channel.
    pub fn new(config: &ClientConfig) -> Self {
        let api_url = config.api_url.to_string();
        Self::with_parts(
            config.ws_url.clone(),
            Arc::new(TungsteniteConnector),
            config.driver_config(),
            config.page_limit,
            move |credential| -> Arc<dyn NotificationApi> {
                Arc::new(ApiClient::new(api_url, credential))
            },
        )
    }

    /// Wire a center from its parts. `make_api` receives the session's
    /// credential feed.
    pub fn with_parts(
        push_base: Url,
        connector: Arc<dyn Connector>,
        driver_config: DriverConfig,
        page_limit: u32,
        make_api: impl FnOnce(watch::Receiver<Option<Credential>>) -> Arc<dyn NotificationApi>,
    ) -> Self {
        let driver = ConnectionDriver::new(connector, driver_config);
        let session = SessionBinding::new(push_base, driver.clone());
        let api = make_api(session.credential());
        let store = Arc::new(NotificationStore::new(api, page_limit));
        let router = EventRouter::new(store.clone()).spawn(&driver);
        Self {
            session,
            store,
            router,
        }
    }

    pub fn login(&self, token: impl Into<String>) -> SessionChange {
        let change = self.session.set_credential(Some(Credential::new(token)));
        if change.clears_cache() {
            self.store.clear();
        }
        change
    }

    pub fn logout(&self) -> SessionChange {
        let change = self.session.set_credential(None);
        if change.clears_cache() {
            self.store.clear();
        }
        change
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.driver().state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.driver().watch_state()
    }

    pub async fn notifications(&self) -> Result<NotificationPage, ApiError> {
        self.store.notifications().await
    }

    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        self.store.unread_count().await
    }

    pub fn watch_notifications(&self) -> watch::Receiver<QuerySnapshot<NotificationPage>> {
        self.store.watch_list()
    }

    pub fn watch_unread_count(&self) -> watch::Receiver<QuerySnapshot<u64>> {
        self.store.watch_unread()
    }

    pub async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        self.store.mark_read(id).await
    }

    pub async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError> {
        self.store.mark_all_read().await
    }

    /// Refetch after a failed read.
    pub async fn retry(&self) -> Result<(), ApiError> {
        self.store.retry().await
    }

    /// Drop the socket and reconnect immediately with a fresh backoff budget.
    pub fn reconnect(&self) {
        self.driver().reconnect();
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn driver(&self) -> &ConnectionDriver {
        self.session.driver()
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        self.driver().release();
        self.router.abort();
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("session", &self.session)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}
