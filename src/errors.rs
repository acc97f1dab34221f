//! Error types for the profile server.
//!
//! Only bind and TLS-configuration failures ever reach the caller of
//! [`LocalServer::start`](crate::LocalServer::start). Problems with the
//! bundled certificate material are [`TlsLoadError`]s: they are logged and
//! recorded, and the server falls back to plaintext instead of failing.
//!
//! # Examples
//!
//! ```rust,ignore
//! use profile_server::errors::ServerError;
//!
//! match server.start(document).await {
//!     Ok(()) => println!("serving"),
//!     Err(ServerError::Bind(reason)) => eprintln!("port unavailable: {}", reason),
//!     Err(other) => eprintln!("could not start: {}", other),
//! }
//! ```

use thiserror::Error;

/// Main error type for server operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to bind to a network address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Server startup errors
    #[error("Failed to start server: {0}")]
    Start(#[from] StartError),

    /// The accept loop hit an error it cannot recover from
    #[error("Accept loop failed: {0}")]
    Accept(String),

    /// The listener task did not shut down cleanly
    #[error("Failed to stop server: {0}")]
    Stop(String),

    /// Trust policy construction errors
    #[error("Trust policy error: {0}")]
    Trust(String),

    /// Profile document errors
    #[error("Profile error: {0}")]
    Profile(String),
}

/// Configuration-related errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Invalid server configuration value
    #[error("Invalid server config: {0}")]
    Server(String),

    /// Configuration file could not be read or parsed
    #[error("Invalid config file: {0}")]
    File(String),
}

/// Server startup errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StartError {
    /// Loaded TLS material was rejected while building the TLS configuration
    #[error("Tls initialization: {0}")]
    Tls(String),
}

/// Problems found while loading bundled TLS material.
///
/// These never abort a start; they are kept so callers can see why the
/// server came up in plaintext.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TlsLoadError {
    #[error("{0} not found")]
    Missing(String),

    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("{0} contains no certificate")]
    NoCertificate(String),

    #[error("{0} contains no private key")]
    NoPrivateKey(String),

    #[error("{path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}
