//! Trust evaluation for connections this process initiates.
//!
//! A [`TrustPolicy`] accepts a peer only if its chain validates against the
//! bundled CA and the leaf is valid for the host the server binds to.

use std::{fmt, sync::Arc};

use log::debug;
use rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        WebPkiServerVerifier,
    },
    crypto::CryptoProvider,
    pki_types::{CertificateDer, ServerName, UnixTime},
    CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::{errors::ServerError, server::tls::crypto_provider};

/// Proof that a peer chain was accepted for a host.
#[derive(Clone, Debug, PartialEq)]
pub struct Credential {
    host: String,
    chain: Vec<CertificateDer<'static>>,
}

impl Credential {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The accepted chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }
}

#[derive(Clone)]
pub struct TrustPolicy {
    host: String,
    verifier: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPolicy")
            .field("host", &self.host)
            .finish()
    }
}

impl TrustPolicy {
    /// Builds a policy trusting `ca_certificate` for peers named `host`.
    pub fn new(ca_certificate: CertificateDer<'static>, host: &str) -> Result<TrustPolicy, ServerError> {
        ServerName::try_from(host.to_string())
            .map_err(|e| ServerError::Trust(format!("invalid host name {}: {}", host, e)))?;

        let mut roots = RootCertStore::empty();
        roots
            .add(ca_certificate)
            .map_err(|e| ServerError::Trust(e.to_string()))?;

        let provider = crypto_provider();
        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| ServerError::Trust(e.to_string()))?;

        Ok(TrustPolicy { host: host.to_string(), verifier, provider })
    }

    /// The only host name this policy accepts peers for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Decides whether `peer_chain` (leaf first) may be trusted for `host`.
    ///
    /// Returns `None` for an empty chain, a host other than the policy's
    /// own, or a chain that does not validate against the CA; the caller
    /// must then cancel the handshake.
    pub fn evaluate(&self, peer_chain: &[CertificateDer<'_>], host: &str) -> Option<Credential> {
        let Some((leaf, intermediates)) = peer_chain.split_first() else {
            debug!("Rejecting empty peer chain");
            return None;
        };

        if !host.eq_ignore_ascii_case(&self.host) {
            debug!("Rejecting peer for {}, policy only trusts {}", host, self.host);
            return None;
        }

        let server_name = ServerName::try_from(self.host.clone()).ok()?;

        match self
            .verifier
            .verify_server_cert(leaf, intermediates, &server_name, &[], UnixTime::now())
        {
            Ok(_) => Some(Credential {
                host: self.host.clone(),
                chain: peer_chain
                    .iter()
                    .map(|certificate| certificate.clone().into_owned())
                    .collect(),
            }),
            Err(e) => {
                debug!("Rejecting peer chain for {}: {}", host, e);
                None
            }
        }
    }

    /// Client configuration whose handshakes are decided by [`evaluate`](Self::evaluate).
    pub fn client_config(&self) -> Result<ClientConfig, ServerError> {
        let mut config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(rustls::DEFAULT_VERSIONS)
            .map_err(|e| ServerError::Trust(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(self.clone()))
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }
}

impl ServerCertVerifier for TrustPolicy {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let host = match server_name {
            ServerName::DnsName(name) => name.as_ref(),
            _ => return Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)),
        };

        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(
            intermediates
                .iter()
                .cloned(),
        );

        match self.evaluate(&chain, host) {
            Some(_) => Ok(ServerCertVerified::assertion()),
            None => Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            )),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.verifier
            .verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.verifier
            .verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier
            .supported_verify_schemes()
    }
}
