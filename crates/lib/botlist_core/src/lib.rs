//! # botlist_core
//!
//! Core domain logic for Botlist: permission resolution over the team graph,
//! the authorization gate, rate limiting, and the webhook registry/dispatch
//! pipeline used for vote notifications.

pub mod audit;
pub mod authz;
pub mod config;
pub mod graph;
pub mod migrate;
pub mod models;
pub mod perms;
pub mod ratelimit;
pub mod reminders;
pub mod store;
pub mod teams;
pub mod uuid;
pub mod votes;
pub mod webhooks;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
