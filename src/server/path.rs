use std::{
    future::Future,
    io,
    path::{Component, PathBuf},
    pin::Pin,
};

use bytes::Bytes;
use http::{
    header::{self, HeaderValue},
    StatusCode,
};
use http_body_util::Full;
use log::{debug, error};
use percent_encoding::percent_decode_str;

use crate::{
    config::PROFILE_CONTENT_TYPE,
    errors::{ConfigError, ServerError},
    Document, ResponseType,
};

pub type PathFuture<'a> = Pin<Box<dyn Future<Output = ResponseType> + Send + 'a>>;

/// A route served by the server.
///
/// `target` is what remains of the request path after the route's own uri.
pub trait Path {
    fn uri(&self) -> &str;
    fn handle<'a>(&'a self, target: &'a str) -> PathFuture<'a>;
}

pub enum HostPath {
    Document(DocumentPath),
    Static(StaticPath),
}

impl HostPath {
    /// Mounts match by prefix, everything else only by exact path.
    pub fn is_mount(&self) -> bool {
        matches!(self, HostPath::Static(_))
    }
}

impl Path for HostPath {
    fn uri(&self) -> &str {
        match self {
            HostPath::Document(document) => document.uri(),
            HostPath::Static(static_path) => static_path.uri(),
        }
    }

    fn handle<'a>(&'a self, target: &'a str) -> PathFuture<'a> {
        match self {
            HostPath::Document(document) => document.handle(target),
            HostPath::Static(static_path) => static_path.handle(target),
        }
    }
}

impl From<DocumentPath> for HostPath {
    fn from(path: DocumentPath) -> Self {
        HostPath::Document(path)
    }
}

impl From<StaticPath> for HostPath {
    fn from(path: StaticPath) -> Self {
        HostPath::Static(path)
    }
}

pub(crate) fn status_response(status: StatusCode) -> ResponseType {
    let reason = status
        .canonical_reason()
        .unwrap_or("");
    let mut response = http::Response::new(Full::new(Bytes::from(reason)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Serves the captured document as a forced download.
pub struct DocumentPath {
    uri: String,
    document: Document,
    disposition: HeaderValue,
}

impl DocumentPath {
    pub fn new(uri: &str, document: Document, filename: &str) -> Result<DocumentPath, ServerError> {
        let disposition = HeaderValue::from_str(&format!("attachment; filename={}", filename))
            .map_err(|_| ConfigError::Server(format!("invalid download filename: {}", filename)))?;

        Ok(DocumentPath { uri: uri.to_string(), document, disposition })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl Path for DocumentPath {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn handle<'a>(&'a self, _target: &'a str) -> PathFuture<'a> {
        Box::pin(async move {
            let mut response = http::Response::new(Full::new(
                self.document
                    .bytes(),
            ));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROFILE_CONTENT_TYPE));
            headers.insert(
                header::CONTENT_DISPOSITION,
                self.disposition
                    .clone(),
            );
            response
        })
    }
}

/// Serves a read-only directory tree by relative path.
pub struct StaticPath {
    uri: String,
    directory: PathBuf,
    index_file: String,
}

impl StaticPath {
    pub fn new<P: Into<PathBuf>>(uri: &str, directory: P, index_file: &str) -> StaticPath {
        StaticPath {
            uri: uri.to_string(),
            directory: directory.into(),
            index_file: index_file.to_string(),
        }
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    /// Maps a request target onto a file below the mount directory.
    ///
    /// Segments are percent-decoded before they are checked. Returns `None`
    /// for anything that could leave the directory or reach a hidden file.
    pub fn resolve(&self, target: &str) -> Option<PathBuf> {
        let mut file = self
            .directory
            .clone();
        for segment in target
            .split('/')
            .filter(|segment| !segment.is_empty())
        {
            let segment = percent_decode_str(segment)
                .decode_utf8()
                .ok()?;
            if segment.starts_with('.') || segment.contains(['/', '\\', '\0']) {
                return None;
            }
            let mut components = std::path::Path::new(&*segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => file.push(&*segment),
                _ => return None,
            }
        }

        if target.is_empty() || target.ends_with('/') {
            file.push(&self.index_file);
        }

        Some(file)
    }
}

impl Path for StaticPath {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn handle<'a>(&'a self, target: &'a str) -> PathFuture<'a> {
        Box::pin(async move {
            let Some(mut file) = self.resolve(target) else {
                debug!("Rejected static path: {}", target);
                return status_response(StatusCode::NOT_FOUND);
            };

            if let Ok(metadata) = tokio::fs::metadata(&file).await {
                if metadata.is_dir() {
                    file.push(&self.index_file);
                }
            }

            match tokio::fs::read(&file).await {
                Ok(data) => {
                    let mut response = http::Response::new(Full::new(Bytes::from(data)));
                    response
                        .headers_mut()
                        .insert(header::CONTENT_TYPE, content_type(&file));
                    response
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Static file not found: {}", file.display());
                    status_response(StatusCode::NOT_FOUND)
                }
                Err(e) => {
                    error!("Cannot read {}: {}", file.display(), e);
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}

fn content_type(file: &std::path::Path) -> HeaderValue {
    let extension = file
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());

    let mime = match extension.as_deref() {
        Some("mobileconfig") => return HeaderValue::from_static(PROFILE_CONTENT_TYPE),
        Some("html") | Some("htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("svg") => mime::IMAGE_SVG,
        _ => mime::APPLICATION_OCTET_STREAM,
    };

    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
