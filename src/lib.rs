//! # profile-server
//!
//! A small local HTTP(S) server that hands a generated configuration profile
//! to whatever client asks for it, together with the landing page that
//! explains how to install it.
//!
//! ## Routes
//!
//! - `/download`: the document handed to [`LocalServer::start`], served as
//!   `application/x-apple-aspen-config` with a forced-download disposition
//! - `/mobileconfig`: the landing page directory
//! - `/`: the rest of the bundled assets
//!
//! ## TLS
//!
//! If the bundled identity and CA certificate both load, the listener speaks
//! HTTPS; otherwise it falls back to plain HTTP and says so through
//! [`LocalServer::tls_mode`] and [`LocalServer::is_degraded`].
//!
//! ## Basic Usage
//!
//! ```rust,ignore
//! use profile_server::{config::ServerConfig, LocalServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .assets_dir("assets")
//!         .certs_dir("certs")
//!         .build()?;
//!
//!     let server = LocalServer::new(config);
//!     server.start(std::fs::read("icons.mobileconfig")?).await?;
//!     println!("open {}", server.url().await.unwrap_or_default());
//!
//!     // ... later, once the profile was fetched
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: server configuration and its builder
//! - [`errors`]: error types
//! - [`profile`]: web-clip configuration profiles
//! - [`server`]: listener, routing and TLS plumbing

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use http_body_util::Full;
use log::info;
use tokio::sync::{broadcast, Mutex};
use tokio_rustls::TlsAcceptor;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    server::{
        http::HttpServer,
        identity::{IdentityLoader, TlsMaterial},
        router::Router,
        tls::{TlsFactory, TlsMode},
        trust::TrustPolicy,
    },
};

pub mod config;
mod document;
pub mod errors;
pub mod profile;
pub mod server;

#[cfg(test)]
mod tests;

pub use document::Document;

pub type ResponseType = http::Response<Full<Bytes>>;

/// Stop events buffered per subscriber before old ones are dropped.
const STOP_EVENT_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Stopped => write!(f, "stopped"),
            ServerState::Running => write!(f, "running"),
        }
    }
}

/// Sent exactly once when a listener instance stops.
///
/// `error` is set when the instance ended because of a failure rather than
/// a requested stop.
#[derive(Clone, Debug, PartialEq)]
pub struct StopEvent {
    pub instance: u64,
    pub error: Option<ServerError>,
}

struct Running {
    server: HttpServer,
    material: TlsMaterial,
}

/// The instance, unless its accept loop has already ended.
fn live(instance: &Option<Running>) -> Option<&Running> {
    instance
        .as_ref()
        .filter(|running| running.server.is_running())
}

/// Handle owning the local server.
///
/// At most one listener instance exists per handle. `start` and `stop` are
/// serialized, so callers always observe a whole transition.
pub struct LocalServer {
    config: ServerConfig,
    instance: Mutex<Option<Running>>,
    events: broadcast::Sender<StopEvent>,
    next_id: AtomicU64,
}

impl LocalServer {
    pub fn new(config: ServerConfig) -> LocalServer {
        let (events, _) = broadcast::channel(STOP_EVENT_CAPACITY);
        LocalServer { config, instance: Mutex::new(None), events, next_id: AtomicU64::new(1) }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Receives one [`StopEvent`] per listener instance started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StopEvent> {
        self.events
            .subscribe()
    }

    /// Serves `document` at `/download`.
    ///
    /// A running instance is stopped first, so the previous document is
    /// unreachable once this returns. On error the server is left stopped.
    pub async fn start(&self, document: impl Into<Document>) -> Result<(), ServerError> {
        let document = document.into();
        let mut instance = self
            .instance
            .lock()
            .await;

        if let Some(mut running) = instance.take() {
            info!("Restarting server instance {}", running.server.id());
            running
                .server
                .stop()
                .await;
        }

        let material = IdentityLoader::from_config(&self.config)
            .load()
            .await;
        let acceptor = match (material.mode(), material.identity(), material.ca_certificate()) {
            (TlsMode::Enabled, Some(identity), Some(ca_certificate)) => {
                let tls_config = TlsFactory::create_tls_config(identity, ca_certificate)?;
                Some(TlsAcceptor::from(Arc::new(tls_config)))
            }
            _ => None,
        };

        let router = Router::for_document(&self.config, document.clone())?;
        let id = self
            .next_id
            .fetch_add(1, Ordering::Relaxed);
        let server = HttpServer::start(id, &self.config, router, acceptor, self.events.clone()).await?;

        info!(
            "Serving {} byte document at {}://{}:{}{}",
            document.len(),
            server
                .tls_mode()
                .scheme(),
            self.config
                .trusted_host(),
            server
                .local_addr()
                .port(),
            config::DOWNLOAD_ROUTE
        );

        *instance = Some(Running { server, material });

        Ok(())
    }

    /// Stops the running instance, if any. Returns within the drain timeout
    /// plus a short margin.
    pub async fn stop(&self) {
        let mut instance = self
            .instance
            .lock()
            .await;

        if let Some(mut running) = instance.take() {
            info!("Stopping server instance {}", running.server.id());
            running
                .server
                .stop()
                .await;
        }
    }

    pub async fn state(&self) -> ServerState {
        let instance = self
            .instance
            .lock()
            .await;
        match live(&instance) {
            Some(_) => ServerState::Running,
            None => ServerState::Stopped,
        }
    }

    /// TLS mode chosen by the running instance.
    pub async fn tls_mode(&self) -> Option<TlsMode> {
        let instance = self
            .instance
            .lock()
            .await;
        live(&instance).map(|running| running.server.tls_mode())
    }

    /// Plaintext was chosen although TLS material was shipped but unusable.
    pub async fn is_degraded(&self) -> bool {
        let instance = self
            .instance
            .lock()
            .await;
        live(&instance).is_some_and(|running| running.material.is_degraded())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let instance = self
            .instance
            .lock()
            .await;
        live(&instance).map(|running| running.server.local_addr())
    }

    /// Base URL of the running instance, using the trusted host name.
    pub async fn url(&self) -> Option<String> {
        let instance = self
            .instance
            .lock()
            .await;
        live(&instance).map(|running| {
            format!(
                "{}://{}:{}/",
                running
                    .server
                    .tls_mode()
                    .scheme(),
                self.config
                    .trusted_host(),
                running
                    .server
                    .local_addr()
                    .port()
            )
        })
    }

    /// Trust policy built from the CA loaded by the running instance.
    pub async fn trust_policy(&self) -> Option<TrustPolicy> {
        let instance = self
            .instance
            .lock()
            .await;
        live(&instance).and_then(|running| {
            running
                .material
                .trust_policy()
                .cloned()
        })
    }

    /// Serves `document` until Ctrl-C or until the listener fails.
    pub async fn run(&self, document: impl Into<Document>) -> Result<(), ServerError> {
        let mut events = self.subscribe();
        self.start(document).await?;

        if let Some(url) = self.url().await {
            info!("Install the profile from {}{}", url.trim_end_matches('/'), config::LANDING_ROUTE);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping server...");
                self.stop().await;
                Ok(())
            }
            event = events.recv() => match event {
                Ok(StopEvent { error: Some(error), .. }) => Err(error),
                _ => Ok(()),
            },
        }
    }
}
