//! Loading of the bundled TLS material.
//!
//! The loader never fails as a whole: each file that is missing or malformed
//! simply yields `None` for its part, and the problem is logged and recorded
//! in [`TlsMaterial::problems`]. TLS is only enabled when both the identity
//! and the CA certificate are usable.

use std::{
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use log::{info, warn};
use tokio::fs;
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    RootCertStore,
};

use crate::{
    config::ServerConfig,
    errors::TlsLoadError,
    server::{
        tls::{TlsFactory, TlsMode},
        trust::TrustPolicy,
    },
};

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// A TLS server credential: private key plus certificate chain, leaf first.
pub struct TlsIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            chain: self
                .chain
                .clone(),
            key: self
                .key
                .clone_key(),
        }
    }
}

impl TlsIdentity {
    /// Parses a PEM bundle holding the certificate chain and the private key.
    ///
    /// `origin` names the bundle in errors.
    pub fn from_pem(pem: &[u8], origin: &str) -> Result<TlsIdentity, TlsLoadError> {
        let chain = rustls_pemfile::certs(&mut BufReader::new(pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsLoadError::Malformed {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;
        if chain.is_empty() {
            return Err(TlsLoadError::NoCertificate(origin.to_string()));
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(pem))
            .map_err(|e| TlsLoadError::Malformed {
                path: origin.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| TlsLoadError::NoPrivateKey(origin.to_string()))?;

        Ok(TlsIdentity { chain, key })
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

/// Parses a CA certificate, DER or PEM, and checks it can act as a trust anchor.
pub fn parse_ca_certificate(
    bytes: &[u8],
    origin: &str,
) -> Result<CertificateDer<'static>, TlsLoadError> {
    let certificate = if bytes.starts_with(PEM_MARKER) {
        rustls_pemfile::certs(&mut BufReader::new(bytes))
            .next()
            .ok_or_else(|| TlsLoadError::NoCertificate(origin.to_string()))?
            .map_err(|e| TlsLoadError::Malformed {
                path: origin.to_string(),
                reason: e.to_string(),
            })?
    } else {
        CertificateDer::from(bytes.to_vec())
    };

    let mut roots = RootCertStore::empty();
    roots
        .add(certificate.clone())
        .map_err(|e| TlsLoadError::Malformed { path: origin.to_string(), reason: e.to_string() })?;

    Ok(certificate)
}

/// Whatever could be loaded from the bundle.
#[derive(Clone, Default)]
pub struct TlsMaterial {
    identity: Option<TlsIdentity>,
    ca_certificate: Option<CertificateDer<'static>>,
    trust_policy: Option<TrustPolicy>,
    problems: Vec<TlsLoadError>,
}

impl TlsMaterial {
    pub fn new(
        identity: Option<TlsIdentity>,
        ca_certificate: Option<CertificateDer<'static>>,
        trust_policy: Option<TrustPolicy>,
    ) -> TlsMaterial {
        TlsMaterial { identity, ca_certificate, trust_policy, problems: Vec::new() }
    }

    pub fn identity(&self) -> Option<&TlsIdentity> {
        self.identity
            .as_ref()
    }

    pub fn ca_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.ca_certificate
            .as_ref()
    }

    pub fn trust_policy(&self) -> Option<&TrustPolicy> {
        self.trust_policy
            .as_ref()
    }

    pub fn problems(&self) -> &[TlsLoadError] {
        &self.problems
    }

    /// TLS is enabled only when identity and CA are both present.
    pub fn mode(&self) -> TlsMode {
        if self
            .identity
            .is_some()
            && self
                .ca_certificate
                .is_some()
        {
            TlsMode::Enabled
        } else {
            TlsMode::Disabled
        }
    }

    /// Plaintext was chosen although some TLS material was shipped.
    pub fn is_degraded(&self) -> bool {
        if self.mode() == TlsMode::Enabled {
            return false;
        }

        self.identity
            .is_some()
            || self
                .ca_certificate
                .is_some()
            || self
                .problems
                .iter()
                .any(|problem| !matches!(problem, TlsLoadError::Missing(_)))
    }
}

/// Loads the identity bundle and CA certificate from fixed locations.
#[derive(Clone, Debug)]
pub struct IdentityLoader {
    identity_path: PathBuf,
    ca_path: PathBuf,
    trusted_host: String,
}

impl IdentityLoader {
    pub fn new<P, Q>(identity_path: P, ca_path: Q, trusted_host: &str) -> IdentityLoader
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        IdentityLoader {
            identity_path: identity_path
                .as_ref()
                .to_path_buf(),
            ca_path: ca_path
                .as_ref()
                .to_path_buf(),
            trusted_host: trusted_host.to_string(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> IdentityLoader {
        Self::new(config.identity_path(), config.ca_path(), config.trusted_host())
    }

    /// Reads the bundle. Safe to call on every start.
    pub async fn load(&self) -> TlsMaterial {
        let mut material = TlsMaterial::default();

        match self
            .load_identity()
            .await
        {
            Ok(identity) => material.identity = Some(identity),
            Err(problem) => {
                warn!("Server identity unavailable: {}", problem);
                material
                    .problems
                    .push(problem);
            }
        }

        match self
            .load_ca_certificate()
            .await
        {
            Ok(ca_certificate) => {
                match TrustPolicy::new(ca_certificate.clone(), &self.trusted_host) {
                    Ok(policy) => material.trust_policy = Some(policy),
                    Err(e) => warn!("Cannot build trust policy: {}", e),
                }
                material.ca_certificate = Some(ca_certificate);
            }
            Err(problem) => {
                warn!("CA certificate unavailable: {}", problem);
                material
                    .problems
                    .push(problem);
            }
        }

        info!("Bundled TLS material selects {} mode", material.mode());

        material
    }

    async fn load_identity(&self) -> Result<TlsIdentity, TlsLoadError> {
        let origin = self
            .identity_path
            .display()
            .to_string();
        let pem = read_bundle_file(&self.identity_path).await?;
        let identity = TlsIdentity::from_pem(&pem, &origin)?;

        TlsFactory::check_identity(&identity)
            .map_err(|e| TlsLoadError::Malformed { path: origin, reason: e.to_string() })?;

        Ok(identity)
    }

    async fn load_ca_certificate(&self) -> Result<CertificateDer<'static>, TlsLoadError> {
        let bytes = read_bundle_file(&self.ca_path).await?;
        parse_ca_certificate(
            &bytes,
            &self
                .ca_path
                .display()
                .to_string(),
        )
    }
}

async fn read_bundle_file(path: &Path) -> Result<Vec<u8>, TlsLoadError> {
    fs::read(path)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TlsLoadError::Missing(
                path.display()
                    .to_string(),
            ),
            _ => TlsLoadError::Unreadable {
                path: path
                    .display()
                    .to_string(),
                reason: e.to_string(),
            },
        })
}
