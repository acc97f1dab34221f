//! Route table.
//!
//! Exact routes win; otherwise the longest mount whose uri is a
//! segment-aligned prefix of the request path serves it.
//!
//! # Examples
//!
//! ```rust,ignore
//! use profile_server::{config::ServerConfig, server::router::Router, Document};
//!
//! let config = ServerConfig::default();
//! let router = Router::for_document(&config, Document::from(b"{}".to_vec()))?;
//! let response = router.route(&http::Method::GET, "/download").await;
//! ```

use std::collections::HashMap;

use http::{header, HeaderValue, Method, StatusCode};
use log::debug;
use radix_trie::Trie;

use crate::{
    config::{ServerConfig, BUNDLE_ROUTE, DOWNLOAD_ROUTE, LANDING_ROUTE},
    errors::ServerError,
    server::path::{status_response, DocumentPath, HostPath, Path, PathFuture, StaticPath},
    Document,
};

#[derive(Default)]
pub struct Router {
    exact: HashMap<String, HostPath>,
    mounts: Trie<String, HostPath>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed route table, closing over `document`.
    pub fn for_document(config: &ServerConfig, document: Document) -> Result<Router, ServerError> {
        let mut router = Router::new();

        router.add_path(DocumentPath::new(DOWNLOAD_ROUTE, document, config.download_filename())?);
        router.add_path(StaticPath::new(
            LANDING_ROUTE,
            config.landing_path(),
            config.index_file(),
        ));
        router.add_path(StaticPath::new(BUNDLE_ROUTE, config.assets_dir(), config.index_file()));

        Ok(router)
    }

    pub fn add_path<P>(&mut self, path: P)
    where
        P: Into<HostPath>,
    {
        let path = path.into();
        let uri = path
            .uri()
            .to_string();
        if path.is_mount() {
            self.mounts
                .insert(uri, path);
        } else {
            self.exact
                .insert(uri, path);
        }
    }

    pub fn route<'a>(&'a self, method: &Method, uri_path: &'a str) -> PathFuture<'a> {
        if method != Method::GET && method != Method::HEAD {
            debug!("Method {} not allowed on {}", method, uri_path);
            return Box::pin(async move {
                let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
                response
            });
        }

        if let Some(path) = self
            .exact
            .get(uri_path)
        {
            return path.handle("");
        }

        match self.find_mount(uri_path) {
            Some((path, target)) => path.handle(target),
            None => Box::pin(async move { status_response(StatusCode::NOT_FOUND) }),
        }
    }

    fn find_mount<'a>(&'a self, uri_path: &'a str) -> Option<(&'a HostPath, &'a str)> {
        let mut candidate = uri_path.to_string();
        loop {
            let path = self
                .mounts
                .get_ancestor_value(&candidate)?;
            let uri = path.uri();
            let target = &uri_path[uri.len()..];

            if uri.ends_with('/') || target.is_empty() || target.starts_with('/') {
                return Some((path, target));
            }

            // The mount only matched part of a segment; keep looking above it.
            if uri.is_empty() {
                return None;
            }
            let mut shorter = uri.chars();
            shorter.next_back();
            candidate = shorter
                .as_str()
                .to_string();
        }
    }
}
