use std::{fmt, sync::Arc};

use log::debug;
use rustls::{crypto::CryptoProvider, pki_types::CertificateDer, ServerConfig};

use crate::{
    errors::{ServerError, StartError::Tls},
    server::identity::TlsIdentity,
};

/// Whether a server instance terminates TLS.
///
/// Decided once per start from the loaded material and never changed while
/// the instance runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TlsMode {
    /// Identity and CA certificate were both usable; the listener speaks HTTPS.
    Enabled,
    /// Plain HTTP.
    Disabled,
}

impl TlsMode {
    pub fn scheme(&self) -> &'static str {
        match self {
            TlsMode::Enabled => "https",
            TlsMode::Disabled => "http",
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsMode::Enabled)
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::Enabled => write!(f, "tls"),
            TlsMode::Disabled => write!(f, "plaintext"),
        }
    }
}

pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

pub struct TlsFactory {}

impl TlsFactory {
    /// Builds the listener's TLS configuration.
    ///
    /// The CA certificate is appended to the identity chain unless the bundle
    /// already carries it, so clients that only know the CA can build the path.
    pub fn create_tls_config(
        identity: &TlsIdentity,
        ca_certificate: &CertificateDer<'static>,
    ) -> Result<ServerConfig, ServerError> {
        let mut chain = identity
            .chain()
            .to_vec();
        if !chain.contains(ca_certificate) {
            chain.push(ca_certificate.clone());
        }

        let chain_len = chain.len();
        let mut tls_config = Self::single_cert_config(chain, identity)?;
        tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        debug!("TLS configuration ready ({} certificates in chain)", chain_len);

        Ok(tls_config)
    }

    /// Checks that an identity can terminate TLS on its own.
    pub(crate) fn check_identity(identity: &TlsIdentity) -> Result<(), ServerError> {
        Self::single_cert_config(
            identity
                .chain()
                .to_vec(),
            identity,
        )
        .map(|_| ())
    }

    fn single_cert_config(
        chain: Vec<CertificateDer<'static>>,
        identity: &TlsIdentity,
    ) -> Result<ServerConfig, ServerError> {
        ServerConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(rustls::DEFAULT_VERSIONS)
            .map_err(|e| Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(
                chain,
                identity
                    .key()
                    .clone_key(),
            )
            .map_err(|e| Tls(e.to_string()).into())
    }
}
