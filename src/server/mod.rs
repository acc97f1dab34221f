//! Listener, routing and TLS plumbing behind [`LocalServer`](crate::LocalServer).
//!
//! # Modules
//!
//! - [`conn`]: TCP accept loop and per-connection serving
//! - [`http`]: one running listener instance and its stop notification
//! - [`identity`]: loading the bundled certificate material
//! - [`path`]: route handlers for the document and static directories
//! - [`router`]: the route table
//! - [`tls`]: listener TLS configuration
//! - [`trust`]: trust evaluation for outgoing connections

pub mod conn;
pub mod http;
pub mod identity;
pub mod path;
pub mod router;
pub mod tls;
pub mod trust;
