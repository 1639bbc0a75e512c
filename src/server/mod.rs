// Server module - HTTP/1.1 listener, accept loop and graceful shutdown

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::proxy::ProxyHandler;

/// Connection-level settings for the accept loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Deadline for a client to finish sending request headers
    pub read_timeout: Duration,
    /// How long in-flight requests may run after shutdown begins
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// HTTP server fronting a single [`ProxyHandler`]
pub struct ProxyServer {
    handler: Arc<ProxyHandler>,
    config: ServerConfig,
}

impl ProxyServer {
    pub fn new(handler: Arc<ProxyHandler>, config: ServerConfig) -> Self {
        Self { handler, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    ///
    /// New connections stop being accepted once `shutdown` fires; open ones
    /// get up to `shutdown_grace` to finish. Log sinks are flushed before
    /// returning.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let graceful = GracefulShutdown::new();
        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(self.config.read_timeout);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let handler = Arc::clone(&self.handler);
                    let service = service_fn(move |request: Request<Incoming>| {
                        let handler = Arc::clone(&handler);
                        async move { Ok::<_, Infallible>(handler.handle(request, peer_addr).await) }
                    });

                    let conn = http.serve_connection(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn);

                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer_addr = %peer_addr, error = %e, "Connection error");
                        }
                    });
                }

                () = &mut shutdown => {
                    info!("Shutdown signal received, draining connections");
                    break;
                }
            }
        }

        // Stop accepting before waiting on in-flight requests
        drop(listener);

        match tokio::time::timeout(self.config.shutdown_grace, graceful.shutdown()).await {
            Ok(()) => info!("All connections drained"),
            Err(_) => warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Grace period elapsed with requests still in flight"
            ),
        }

        self.handler.shutdown();
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
