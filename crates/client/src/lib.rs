//! Bestflow client: real-time notification delivery and cache sync
//!
//! This crate keeps a push channel to the bestflow server alive and reconciles
//! the pushed events with a client-side cache of the notification pull API.

pub mod api_client;
pub mod auth_session;
pub mod center;
pub mod config;
pub mod logging;
pub mod stores;
pub mod ws;

pub use api_client::{ApiClient, NotificationApi};
pub use auth_session::{Credential, SessionBinding, SessionChange};
pub use center::NotificationCenter;
pub use config::ClientConfig;
