//! Session binding: ties the push channel to the current bearer credential.
//!
//! The credential is injected explicitly with [`SessionBinding::set_credential`].
//! The binding derives the [`ChannelEndpoint`] from it and keeps the driver in
//! step: a new user reconnects, a logout disconnects before the endpoint goes
//! away, so no timer outlives the session.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use url::Url;

use crate::ws::{ChannelEndpoint, ConnectionDriver};

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// What a credential change did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    SignedIn,
    /// A different credential replaced the previous one
    SwitchedUser,
    SignedOut,
}

impl SessionChange {
    /// Whether per-user cached data must be dropped.
    pub fn clears_cache(&self) -> bool {
        matches!(self, SessionChange::SwitchedUser | SessionChange::SignedOut)
    }
}

pub struct SessionBinding {
    push_base: Url,
    driver: ConnectionDriver,
    credential_tx: watch::Sender<Option<Credential>>,
    endpoint: Mutex<Option<ChannelEndpoint>>,
}

impl SessionBinding {
    pub fn new(push_base: Url, driver: ConnectionDriver) -> Self {
        let (credential_tx, _) = watch::channel(None);
        Self {
            push_base,
            driver,
            credential_tx,
            endpoint: Mutex::new(None),
        }
    }

    /// Credential feed for HTTP clients.
    pub fn credential(&self) -> watch::Receiver<Option<Credential>> {
        self.credential_tx.subscribe()
    }

    pub fn is_signed_in(&self) -> bool {
        self.credential_tx.borrow().is_some()
    }

    /// Current endpoint; `None` while signed out.
    pub fn endpoint(&self) -> Option<ChannelEndpoint> {
        self.endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn driver(&self) -> &ConnectionDriver {
        &self.driver
    }

    /// Replace the held credential and bring the push channel in line.
    pub fn set_credential(&self, credential: Option<Credential>) -> SessionChange {
        let mut endpoint = self.endpoint.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.credential_tx.borrow().clone();

        let change = match (&previous, &credential) {
            (None, None) => SessionChange::Unchanged,
            (Some(a), Some(b)) if a == b => SessionChange::Unchanged,
            (None, Some(_)) => SessionChange::SignedIn,
            (Some(_), Some(_)) => SessionChange::SwitchedUser,
            (Some(_), None) => SessionChange::SignedOut,
        };

        match change {
            SessionChange::Unchanged => {}
            SessionChange::SignedOut => {
                // Tear down first so nothing can fire against a null endpoint
                self.driver.release();
                *endpoint = None;
                self.credential_tx.send_replace(None);
                tracing::info!("signed out, push channel released");
            }
            SessionChange::SignedIn | SessionChange::SwitchedUser => {
                if change == SessionChange::SwitchedUser {
                    self.driver.disconnect();
                }
                let derived = credential
                    .as_ref()
                    .map(|c| ChannelEndpoint::derive(&self.push_base, c.expose()));
                *endpoint = derived.clone();
                self.credential_tx.send_replace(credential);
                tracing::info!(?change, "credential changed, connecting push channel");
                self.driver.connect(derived);
            }
        }
        change
    }
}

impl fmt::Debug for SessionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBinding")
            .field("push_base", &self.push_base.as_str())
            .field("signed_in", &self.is_signed_in())
            .finish_non_exhaustive()
    }
}
