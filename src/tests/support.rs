//! Fixtures shared by the test modules: throwaway bundles, generated
//! certificates and a bare hyper client.

use std::{error::Error, fs, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyUsagePurpose,
};
use rustls::{pki_types::ServerName, ClientConfig};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::{ServerConfig, ServerConfigBuilder};

pub const ROOT_INDEX: &str = "<html>bundle</html>";
pub const LANDING_INDEX: &str = "<html>install the profile</html>";
pub const LANDING_CSS: &str = "body { margin: 0 }";

/// A bundle directory laid out like a shipped install.
pub struct Bundle {
    dir: TempDir,
}

impl Bundle {
    pub fn new() -> Result<Bundle, Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let assets = dir
            .path()
            .join("assets");
        fs::create_dir_all(assets.join("mobileconfig"))?;
        fs::create_dir_all(
            dir.path()
                .join("certs"),
        )?;

        fs::write(assets.join("index.html"), ROOT_INDEX)?;
        fs::write(assets.join("mobileconfig/index.html"), LANDING_INDEX)?;
        fs::write(assets.join("mobileconfig/style.css"), LANDING_CSS)?;

        Ok(Bundle { dir })
    }

    pub fn assets(&self) -> PathBuf {
        self.dir
            .path()
            .join("assets")
    }

    pub fn certs(&self) -> PathBuf {
        self.dir
            .path()
            .join("certs")
    }

    /// Config on an ephemeral port with a short drain.
    pub fn config(&self) -> Result<ServerConfig, Box<dyn Error>> {
        self.config_on(0)
    }

    pub fn config_on(&self, port: u16) -> Result<ServerConfig, Box<dyn Error>> {
        Ok(self
            .builder()
            .port(port)
            .build()?)
    }

    /// Builder preset with the bundle directories, ephemeral port and short drain.
    pub fn builder(&self) -> ServerConfigBuilder {
        ServerConfig::builder()
            .port(0)
            .assets_dir(self.assets())
            .certs_dir(self.certs())
            .drain_timeout(Duration::from_millis(500))
    }

    pub fn install_identity(&self, leaf: &Leaf) -> Result<(), Box<dyn Error>> {
        fs::write(
            self.certs()
                .join("localhost.pem"),
            &leaf.bundle_pem,
        )?;
        Ok(())
    }

    pub fn install_ca(&self, ca: &TestCa) -> Result<(), Box<dyn Error>> {
        fs::write(
            self.certs()
                .join("ca.der"),
            &ca.der,
        )?;
        Ok(())
    }

    pub fn write_cert_file(&self, name: &str, contents: &[u8]) -> Result<(), Box<dyn Error>> {
        fs::write(
            self.certs()
                .join(name),
            contents,
        )?;
        Ok(())
    }
}

/// A test certificate authority.
pub struct TestCa {
    certificate: Certificate,
    pub der: Vec<u8>,
    pub pem: String,
}

/// A leaf certificate and its PEM bundle (chain plus key).
pub struct Leaf {
    pub der: Vec<u8>,
    pub bundle_pem: String,
}

impl TestCa {
    pub fn new(name: &str) -> Result<TestCa, Box<dyn Error>> {
        let mut params = CertificateParams::new(Vec::new());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, name);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let certificate = Certificate::from_params(params)?;
        let der = certificate.serialize_der()?;
        let pem = certificate.serialize_pem()?;

        Ok(TestCa { certificate, der, pem })
    }

    pub fn issue(&self, host: &str) -> Result<Leaf, Box<dyn Error>> {
        let mut params = CertificateParams::new(vec![host.to_string()]);
        params
            .distinguished_name
            .push(DnType::CommonName, host);
        let leaf = Certificate::from_params(params)?;

        let der = leaf.serialize_der_with_signer(&self.certificate)?;
        let bundle_pem = format!(
            "{}{}",
            leaf.serialize_pem_with_signer(&self.certificate)?,
            leaf.serialize_private_key_pem()
        );

        Ok(Leaf { der, bundle_pem })
    }
}

pub fn self_signed(host: &str) -> Result<Leaf, Box<dyn Error>> {
    let certificate = rcgen::generate_simple_self_signed(vec![host.to_string()])?;
    Ok(Leaf {
        der: certificate.serialize_der()?,
        bundle_pem: format!(
            "{}{}",
            certificate.serialize_pem()?,
            certificate.serialize_private_key_pem()
        ),
    })
}

pub struct Fetched {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Fetched {
    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| {
                value
                    .to_str()
                    .ok()
            })
    }
}

pub async fn fetch(addr: SocketAddr, path: &str) -> Result<Fetched, Box<dyn Error>> {
    request(addr, Method::GET, path).await
}

/// [`fetch`] with an error type that can leave a spawned task.
pub async fn fetch_detached(addr: SocketAddr, path: String) -> Result<Fetched, String> {
    fetch(addr, &path)
        .await
        .map_err(|e| e.to_string())
}

pub async fn request(addr: SocketAddr, method: Method, path: &str) -> Result<Fetched, Box<dyn Error>> {
    let stream = TcpStream::connect(addr).await?;
    send(TokioIo::new(stream), method, path).await
}

pub async fn fetch_tls(
    addr: SocketAddr,
    client_config: ClientConfig,
    path: &str,
) -> Result<Fetched, Box<dyn Error>> {
    let connector = TlsConnector::from(Arc::new(client_config));
    let stream = TcpStream::connect(addr).await?;
    let tls_stream = connector
        .connect(ServerName::try_from("localhost")?, stream)
        .await?;
    send(TokioIo::new(tls_stream), Method::GET, path).await
}

async fn send<I>(io: I, method: Method, path: &str) -> Result<Fetched, Box<dyn Error>>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let request = http::Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, "localhost")
        .body(Empty::<Bytes>::new())?;

    let response = sender
        .send_request(request)
        .await?;
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await?
        .to_bytes();

    Ok(Fetched { status: parts.status, headers: parts.headers, body })
}

/// Reserves a free loopback port and releases it again.
pub fn free_port() -> Result<u16, Box<dyn Error>> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener
        .local_addr()?
        .port())
}
