//! HTTP listener serving the composed routing table.
//!
//! Uses hyper-util's auto connection builder directly so the request-header
//! read timeout can be applied per connection. Construction does not touch
//! the network; `bind` opens the socket; `serve` runs the accept loop until
//! the shutdown future resolves, then lets in-flight connections finish.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, body::Body, extract::ConnectInfo};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// How long in-flight connections get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A constructed, not yet bound, HTTP listener.
pub struct HttpListener {
    address: String,
    read_header_timeout: Duration,
    app: Router,
}

impl HttpListener {
    pub fn new(address: impl Into<String>, app: Router, read_header_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            read_header_timeout,
            app,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn bind(self) -> Result<BoundHttpListener, GatewayError> {
        let bind_err = |source| GatewayError::HttpBind {
            addr: self.address.clone(),
            source,
        };
        let listener = TcpListener::bind(self.address.as_str()).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!("HTTP listener bound on http://{local_addr}");

        Ok(BoundHttpListener {
            listener,
            local_addr,
            read_header_timeout: self.read_header_timeout,
            app: self.app,
        })
    }
}

/// An HTTP listener holding its socket.
pub struct BoundHttpListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    read_header_timeout: Duration,
    app: Router,
}

impl BoundHttpListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            self.app.clone(),
                            self.read_header_timeout,
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("HTTP accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        info!("HTTP listener on {} shutting down", self.local_addr);
        drop(self.listener);
        drop(stop_rx);
        let _ = stop_tx.send(true);
        if tokio::time::timeout(DRAIN_TIMEOUT, stop_tx.closed()).await.is_err() {
            warn!("HTTP connections still open after {DRAIN_TIMEOUT:?}");
        }
        info!("HTTP listener on {} stopped", self.local_addr);
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    read_header_timeout: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let svc = hyper::service::service_fn(move |mut req: hyper::Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(req.map(Body::new))
    });

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_header_timeout);
    let conn = builder.serve_connection_with_upgrades(io, svc);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("Connection from {peer} ended: {e}");
            }
        }
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!("Connection from {peer} ended during shutdown: {e}");
            }
        }
    }
}
