//! Configuration builders and types for the profile server.
//!
//! The defaults describe the layout the server is normally shipped with:
//!
//! ```text
//! assets/                 served at `/`
//!   index.html
//!   mobileconfig/         served at `/mobileconfig`
//!     index.html
//! certs/                  never served
//!   localhost.pem         certificate chain + private key (PEM)
//!   ca.der                CA certificate (DER)
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use profile_server::config::ServerConfig;
//!
//! let config = ServerConfig::builder()
//!     .port(9000)
//!     .assets_dir("/opt/profile-server/assets")
//!     .certs_dir("/opt/profile-server/certs")
//!     .build()?;
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::errors::{ConfigError, ServerError};

/// Route serving the generated document.
pub const DOWNLOAD_ROUTE: &str = "/download";
/// Route serving the installer landing page directory.
pub const LANDING_ROUTE: &str = "/mobileconfig";
/// Catch-all route serving the rest of the bundle.
pub const BUNDLE_ROUTE: &str = "/";
/// Content type the profile installer expects for configuration profiles.
pub const PROFILE_CONTENT_TYPE: &str = "application/x-apple-aspen-config";

const DEFAULT_PORT: u16 = 9000;
const DEFAULT_INTERFACE: &str = "localhost";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_interface() -> String {
    DEFAULT_INTERFACE.to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_landing_dir() -> String {
    "mobileconfig".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_identity_file() -> String {
    "localhost.pem".to_string()
}

fn default_ca_file() -> String {
    "ca.der".to_string()
}

fn default_trusted_host() -> String {
    "localhost".to_string()
}

fn default_download_filename() -> String {
    "icons.mobileconfig".to_string()
}

/// Builder for creating `ServerConfig` instances.
///
/// Starts from the shipped defaults; every setter overrides one value.
///
/// # Examples
///
/// ```rust,ignore
/// use profile_server::config::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .port(0)
///     .concurrency(2)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Sets the port to listen on. `0` picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the interface to bind to.
    ///
    /// `localhost` binds the IPv4 loopback address; otherwise an IP literal
    /// is expected.
    pub fn interface(mut self, interface: &str) -> Self {
        self.config.interface = interface.to_string();
        self
    }

    /// Sets how many requests are processed at the same time.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Sets how long `stop` waits for in-flight requests before closing
    /// their connections.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets how long a client may take to complete the TLS handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the bundle root served at `/`.
    pub fn assets_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.assets_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the landing page directory, relative to the bundle root.
    pub fn landing_dir(mut self, dir: &str) -> Self {
        self.config.landing_dir = dir.to_string();
        self
    }

    /// Sets the file served for directory requests.
    pub fn index_file(mut self, file: &str) -> Self {
        self.config.index_file = file.to_string();
        self
    }

    /// Sets the directory holding the identity bundle and CA certificate.
    pub fn certs_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.certs_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the identity bundle file name inside the certificate directory.
    pub fn identity_file(mut self, file: &str) -> Self {
        self.config.identity_file = file.to_string();
        self
    }

    /// Sets the CA certificate file name inside the certificate directory.
    pub fn ca_file(mut self, file: &str) -> Self {
        self.config.ca_file = file.to_string();
        self
    }

    /// Sets the host name peer certificates must be valid for.
    pub fn trusted_host(mut self, host: &str) -> Self {
        self.config.trusted_host = host.to_string();
        self
    }

    /// Sets the file name announced in the download's `Content-Disposition`.
    pub fn download_filename(mut self, filename: &str) -> Self {
        self.config.download_filename = filename.to_string();
        self
    }

    /// Creates the `ServerConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range, see [`ServerConfig::validate`].
    pub fn build(self) -> Result<ServerConfig, ServerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Server configuration.
///
/// Can be built in code or deserialized from YAML; missing keys take the
/// shipped defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_interface")]
    interface: String,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
    #[serde(default = "default_drain_timeout_ms")]
    drain_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    handshake_timeout_ms: u64,
    #[serde(default = "default_assets_dir")]
    assets_dir: PathBuf,
    #[serde(default = "default_landing_dir")]
    landing_dir: String,
    #[serde(default = "default_index_file")]
    index_file: String,
    #[serde(default = "default_certs_dir")]
    certs_dir: PathBuf,
    #[serde(default = "default_identity_file")]
    identity_file: String,
    #[serde(default = "default_ca_file")]
    ca_file: String,
    #[serde(default = "default_trusted_host")]
    trusted_host: String,
    #[serde(default = "default_download_filename")]
    download_filename: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            interface: default_interface(),
            concurrency: default_concurrency(),
            drain_timeout_ms: default_drain_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            assets_dir: default_assets_dir(),
            landing_dir: default_landing_dir(),
            index_file: default_index_file(),
            certs_dir: default_certs_dir(),
            identity_file: default_identity_file(),
            ca_file: default_ca_file(),
            trusted_host: default_trusted_host(),
            download_filename: default_download_filename(),
        }
    }
}

impl ServerConfig {
    /// Creates a new `ServerConfigBuilder` seeded with the defaults.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder { config: ServerConfig::default() }
    }

    /// Parses a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<ServerConfig, ServerError> {
        let config = serde_yaml_ng::from_str::<ServerConfig>(yaml)
            .map_err(|e| ConfigError::File(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ServerError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the concurrency is zero, or if the interface,
    /// trusted host, index file or download file name is empty.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Server("concurrency must be at least 1".to_string()).into());
        }
        if self
            .interface
            .is_empty()
        {
            return Err(ConfigError::Server("interface is empty".to_string()).into());
        }
        if self
            .trusted_host
            .is_empty()
        {
            return Err(ConfigError::Server("trusted host is empty".to_string()).into());
        }
        if self
            .index_file
            .is_empty()
        {
            return Err(ConfigError::Server("index file is empty".to_string()).into());
        }
        if self
            .download_filename
            .is_empty()
        {
            return Err(ConfigError::Server("download filename is empty".to_string()).into());
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Absolute-or-relative path of the landing page directory.
    pub fn landing_path(&self) -> PathBuf {
        self.assets_dir
            .join(&self.landing_dir)
    }

    pub fn index_file(&self) -> &str {
        &self.index_file
    }

    pub fn certs_dir(&self) -> &Path {
        &self.certs_dir
    }

    pub fn identity_path(&self) -> PathBuf {
        self.certs_dir
            .join(&self.identity_file)
    }

    pub fn ca_path(&self) -> PathBuf {
        self.certs_dir
            .join(&self.ca_file)
    }

    pub fn trusted_host(&self) -> &str {
        &self.trusted_host
    }

    pub fn download_filename(&self) -> &str {
        &self.download_filename
    }
}
