//! HTTP relay for a single paired messaging session.
//!
//! Exposes the pairing, status, disconnect and send operations of
//! [`wa_session::LifecycleManager`] as a small JSON API guarded by a shared
//! bearer token.

pub mod api;
pub mod auth;
pub mod config;
