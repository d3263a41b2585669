//! Client-side caches fed by the pull API and reconciled with pushed events.

pub mod notifications;
pub mod query;

pub use notifications::NotificationStore;
pub use query::{QueryCell, QuerySnapshot, QueryStatus};
