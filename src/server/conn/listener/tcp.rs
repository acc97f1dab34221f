use std::{convert::Infallible, io, net::SocketAddr, sync::Arc, time::Duration};

use http::StatusCode;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use tokio::{
    net::TcpStream,
    sync::{watch, Semaphore},
    task::JoinSet,
};
use tokio_rustls::TlsAcceptor;

use crate::{
    errors::ServerError,
    server::{
        conn::listener::{resolve_interface, ListenerSettings},
        path::status_response,
        router::Router,
    },
    ResponseType,
};

type ShutdownSignal = watch::Receiver<bool>;

pub struct TcpListener {
    inner: tokio::net::TcpListener,
    local_addr: SocketAddr,
}

impl TcpListener {
    pub async fn bind(interface: &str, port: u16) -> Result<TcpListener, ServerError> {
        let addr = SocketAddr::from((resolve_interface(interface)?, port));

        let inner = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        let local_addr = inner
            .local_addr()
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;

        Ok(TcpListener { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until `shutdown` flips to `true` or its sender
    /// goes away, then drains connections within the drain timeout.
    ///
    /// Returns an error only when accepting failed for good.
    pub async fn serve(
        self,
        router: Arc<Router>,
        acceptor: Option<TlsAcceptor>,
        settings: ListenerSettings,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let limiter = Arc::new(Semaphore::new(settings.concurrency));
        let connection_shutdown = shutdown.clone();
        let mut connections = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut shutdown) => {
                    debug!("Listener on {} asked to stop", self.local_addr);
                    break Ok(());
                }

                accepted = self.inner.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) if is_transient(&e) => {
                            warn!("Cannot accept connection: {}", e);
                            continue;
                        }
                        Err(e) => {
                            error!("Accept loop on {} failed: {}", self.local_addr, e);
                            break Err(ServerError::Accept(e.to_string()));
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Cannot set TCP_NODELAY for {}: {}", peer, e);
                    }

                    let connection = Connection {
                        peer,
                        router: router.clone(),
                        limiter: limiter.clone(),
                        shutdown: connection_shutdown.clone(),
                    };

                    match &acceptor {
                        Some(acceptor) => {
                            connections.spawn(connection.serve_tls(
                                acceptor.clone(),
                                stream,
                                settings.handshake_timeout,
                            ));
                        }
                        None => {
                            connections.spawn(connection.serve(TokioIo::new(stream)));
                        }
                    }
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        drop(self.inner);
        drain(connections, settings.drain_timeout).await;

        outcome
    }
}

/// Resolves once a stop was requested or the sender is gone. The watch
/// guard is dropped before returning.
async fn stop_requested(shutdown: &mut ShutdownSignal) {
    let _ = shutdown
        .wait_for(|stop| *stop)
        .await;
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn drain(mut connections: JoinSet<()>, timeout: Duration) {
    if connections.is_empty() {
        return;
    }

    info!("Draining {} connections", connections.len());

    let drained = tokio::time::timeout(timeout, async {
        while connections
            .join_next()
            .await
            .is_some()
        {}
    })
    .await;

    if drained.is_err() {
        warn!("Closing {} connections after {:?} drain timeout", connections.len(), timeout);
        connections
            .shutdown()
            .await;
    }
}

struct Connection {
    peer: SocketAddr,
    router: Arc<Router>,
    limiter: Arc<Semaphore>,
    shutdown: ShutdownSignal,
}

impl Connection {
    async fn serve_tls(self, acceptor: TlsAcceptor, stream: TcpStream, handshake_timeout: Duration) {
        match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => {
                self.serve(TokioIo::new(tls_stream))
                    .await
            }
            Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", self.peer, e),
            Err(_) => warn!("TLS handshake with {} timed out", self.peer),
        }
    }

    async fn serve<I>(self, io: I)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let Connection { peer, router, limiter, mut shutdown } = self;

        let service = service_fn(move |request| {
            let router = router.clone();
            let limiter = limiter.clone();
            async move { dispatch(router, limiter, request).await }
        });

        let connection = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    debug!("Error serving connection from {}: {}", peer, e);
                }
            }
            _ = stop_requested(&mut shutdown) => {
                connection
                    .as_mut()
                    .graceful_shutdown();
                if let Err(e) = connection.await {
                    debug!("Error closing connection from {}: {}", peer, e);
                }
            }
        }
    }
}

/// Routes one request once a concurrency permit is free.
async fn dispatch(
    router: Arc<Router>,
    limiter: Arc<Semaphore>,
    request: hyper::Request<Incoming>,
) -> Result<ResponseType, Infallible> {
    let Ok(_permit) = limiter
        .acquire()
        .await
    else {
        return Ok(status_response(StatusCode::SERVICE_UNAVAILABLE));
    };

    let method = request
        .method()
        .clone();
    let path = request
        .uri()
        .path()
        .to_string();

    let response = router
        .route(&method, &path)
        .await;

    info!("{} {} {}", method, path, response.status().as_u16());

    Ok(response)
}
