use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{error, info, warn};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    server::{
        conn::listener::{tcp::TcpListener, ListenerSettings},
        router::Router,
        tls::TlsMode,
    },
    StopEvent,
};

/// Extra time `stop` grants the listener task beyond the drain timeout
/// before aborting it.
pub(crate) const STOP_MARGIN: Duration = Duration::from_millis(500);

/// One bound listener and the task running its accept loop.
///
/// Every instance reports exactly one [`StopEvent`], however it ends.
pub struct HttpServer {
    id: u64,
    local_addr: SocketAddr,
    tls_mode: TlsMode,
    drain_timeout: Duration,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    notifier: StopNotifier,
}

impl HttpServer {
    /// Binds the listener and starts accepting.
    ///
    /// Binding happens before this returns, so a port conflict surfaces here
    /// and not through the stop event.
    pub async fn start(
        id: u64,
        config: &ServerConfig,
        router: Router,
        acceptor: Option<TlsAcceptor>,
        events: broadcast::Sender<StopEvent>,
    ) -> Result<HttpServer, ServerError> {
        let listener = TcpListener::bind(config.interface(), config.port()).await?;
        let local_addr = listener.local_addr();
        let tls_mode = match acceptor {
            Some(_) => TlsMode::Enabled,
            None => TlsMode::Disabled,
        };
        let settings = ListenerSettings::from_config(config);
        let (shutdown, signal) = watch::channel(false);
        let notifier = StopNotifier::new(id, events);

        let task = tokio::spawn({
            let notifier = notifier.clone();
            let router = Arc::new(router);
            async move {
                let outcome = listener
                    .serve(router, acceptor, settings, signal)
                    .await;

                match &outcome {
                    Ok(()) => info!("Server instance {} on {} stopped", id, local_addr),
                    Err(e) => error!("Server instance {} on {} stopped: {}", id, local_addr, e),
                }

                notifier.notify(outcome.err());
            }
        });

        info!("Server instance {} listening on {} ({})", id, local_addr, tls_mode);

        Ok(HttpServer {
            id,
            local_addr,
            tls_mode,
            drain_timeout: settings.drain_timeout,
            shutdown,
            task: Some(task),
            notifier,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// False once the accept loop has ended, whether stopped or failed.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Asks the accept loop to stop without waiting for it.
    pub fn signal_shutdown(&self) {
        // No receivers left means the loop already ended on its own.
        let _ = self
            .shutdown
            .send(true);
    }

    /// Stops accepting, drains connections, and waits for the task.
    ///
    /// Never waits longer than the drain timeout plus a small margin; a task
    /// still alive by then is aborted. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        self.signal_shutdown();

        let grace = self.drain_timeout + STOP_MARGIN;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Server instance {} task failed: {}", self.id, e);
                self.notifier
                    .notify(Some(ServerError::Stop(e.to_string())));
            }
            Err(_) => {
                warn!("Server instance {} did not stop within {:?}, aborting", self.id, grace);
                task.abort();
                self.notifier
                    .notify(Some(ServerError::Stop(format!("listener did not stop within {:?}", grace))));
            }
        }
    }
}

/// Publishes the stop event of one instance, at most once.
#[derive(Clone)]
struct StopNotifier {
    id: u64,
    events: broadcast::Sender<StopEvent>,
    sent: Arc<AtomicBool>,
}

impl StopNotifier {
    fn new(id: u64, events: broadcast::Sender<StopEvent>) -> StopNotifier {
        StopNotifier { id, events, sent: Arc::new(AtomicBool::new(false)) }
    }

    fn notify(&self, error: Option<ServerError>) {
        if self
            .sent
            .swap(true, Ordering::AcqRel)
        {
            return;
        }

        // Sending fails only when nobody subscribed.
        let _ = self
            .events
            .send(StopEvent { instance: self.id, error });
    }
}
