//! Minimal hyper listener for an [`App`].
//!
//! The dispatch core does not depend on this module; any code that can turn
//! a connection into `http::Request`s can drive [`App::call`] directly. This
//! is the batteries-included option: plain TCP, HTTP/1.1 and HTTP/2 on the
//! same port, and a graceful drain when the shutdown future resolves.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::app::App;
use crate::error::Error;

/// The HTTP server.
pub struct Server {
    source: Source,
}

enum Source {
    Addr(SocketAddr),
    Listener(TcpListener),
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use trellis::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { source: Source::Addr(addr) }
    }

    /// Serves on an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { source: Source::Listener(listener) }
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then waits for in-flight
    /// connections to finish.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `shutdown` resolves, then stops accepting and
    /// drains in-flight connections before returning.
    pub async fn serve_with_shutdown<F>(self, app: App, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let listener = match self.source {
            Source::Addr(addr) => TcpListener::bind(addr).await?,
            Source::Listener(listener) => listener,
        };
        info!(addr = %listener.local_addr()?, "trellis listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(app.clone(), stream, peer));
                    }
                    Err(e) => error!("accept error: {e}"),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        info!("trellis stopped");
        Ok(())
    }
}

async fn serve_connection(app: App, stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "connection accepted");
    let svc = service_fn(move |req| {
        let app = app.clone();
        async move { Ok::<_, Infallible>(app.call(req).await) }
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(stream), svc)
        .await
    {
        error!(%peer, "connection error: {e}");
    }
}

/// Resolves on SIGTERM or Ctrl-C (Ctrl-C only off Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
