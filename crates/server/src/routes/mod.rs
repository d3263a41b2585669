//! API route handlers.

pub mod notifications;
