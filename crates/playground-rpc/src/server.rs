//! WebSocket JSON-RPC listener using Axum.
//!
//! Handles HTTP upgrade to WebSocket, ping/pong, and message routing to the
//! `RequestHandler`. Construction (`RpcListener::new`) never touches the
//! network; `bind` opens the socket and `BoundRpcListener::serve` runs the
//! accept loop until the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use playground_protocol::{Call, Notice, Reply, Welcome};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Trait implemented by the RPC router to handle incoming requests.
/// The listener calls this for every well-formed JSON-RPC request.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a JSON-RPC request and return a response.
    fn handle_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> impl Future<Output = playground_protocol::CallResult> + Send;

    /// Namespaces advertised to clients on connect and by `/health`.
    fn namespaces(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Errors raised while bringing the listener up or running it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("listener stopped: {0}")]
    Serve(#[from] std::io::Error),
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct RpcListenerConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname or address to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Enable verbose connection logging
    pub verbose_logging: bool,
}

impl Default for RpcListenerConfig {
    fn default() -> Self {
        Self {
            port: 8260,
            hostname: "0.0.0.0".into(),
            max_connections: Some(64),
            verbose_logging: false,
        }
    }
}

/// Shared state for the listener.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: RpcListenerConfig,
    /// Connected client count (for health check)
    client_count: AtomicUsize,
}

/// A constructed, not yet bound, RPC listener.
pub struct RpcListener<H: RequestHandler> {
    config: RpcListenerConfig,
    handler: Arc<H>,
}

impl<H: RequestHandler> RpcListener<H> {
    pub fn new(config: RpcListenerConfig, handler: Arc<H>) -> Self {
        Self { config, handler }
    }

    pub fn config(&self) -> &RpcListenerConfig {
        &self.config
    }

    /// `host:port` this listener will bind to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.hostname, self.config.port)
    }

    /// The Axum app serving `/rpc` and `/health`.
    pub fn app(&self) -> Router {
        let state = Arc::new(AppState {
            handler: self.handler.clone(),
            config: self.config.clone(),
            client_count: AtomicUsize::new(0),
        });

        Router::new()
            .route("/rpc", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state)
    }

    /// Bind the listening socket.
    pub async fn bind(self) -> Result<BoundRpcListener, TransportError> {
        let addr = self.address();
        let listener = TcpListener::bind((self.config.hostname.as_str(), self.config.port))
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let app = self.app();

        info!("RPC listener bound on ws://{local_addr}/rpc");

        Ok(BoundRpcListener {
            listener,
            local_addr,
            app,
        })
    }
}

/// An RPC listener holding its socket, ready to accept connections.
pub struct BoundRpcListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
}

impl BoundRpcListener {
    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` resolves, then drain gracefully.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("RPC listener on {} stopped", self.local_addr);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: RequestHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    let Some(slot) = ClientSlot::reserve(&state) else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    // A failed upgrade drops the callback, and the slot with it.
    ws.on_upgrade(move |socket| handle_ws_connection(socket, slot))
        .into_response()
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
        "namespaces": state.handler.namespaces(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

/// A counted client connection. Reserved before the upgrade so concurrent
/// handshakes cannot overshoot `max_connections`; released on drop.
struct ClientSlot<H: RequestHandler> {
    state: Arc<AppState<H>>,
}

impl<H: RequestHandler> ClientSlot<H> {
    fn reserve(state: &Arc<AppState<H>>) -> Option<Self> {
        let previous = state.client_count.fetch_add(1, Ordering::AcqRel);
        if let Some(max) = state.config.max_connections {
            if previous >= max {
                state.client_count.fetch_sub(1, Ordering::AcqRel);
                warn!("Connection rejected: max connections reached ({max})");
                return None;
            }
        }
        Some(Self {
            state: state.clone(),
        })
    }
}

impl<H: RequestHandler> Drop for ClientSlot<H> {
    fn drop(&mut self) {
        let remaining = self.state.client_count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!("RPC client slot released (total: {remaining})");
    }
}

async fn handle_ws_connection<H: RequestHandler>(socket: WebSocket, slot: ClientSlot<H>) {
    let state = &slot.state;
    let client_id = uuid::Uuid::new_v4().to_string();
    if state.config.verbose_logging {
        info!("RPC client connected: {client_id}");
    } else {
        debug!("RPC client connected: {client_id}");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    send_welcome(&mut ws_tx, &client_id, state.handler.namespaces()).await;

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = handle_message(&text, &state.handler).await;
                if let Err(e) = ws_tx.send(Message::Text(response.into())).await {
                    error!("Failed to send response to {client_id}: {e}");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error for {client_id}: {e}");
                break;
            }
            _ => {}
        }
    }

    debug!("RPC client disconnected: {client_id}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn send_welcome(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    client_id: &str,
    namespaces: Vec<String>,
) {
    let welcome = Notice::welcome(Welcome {
        client_id: client_id.to_string(),
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        namespaces,
    });
    if let Ok(text) = serde_json::to_string(&welcome) {
        let _ = ws_tx.send(Message::Text(text.into())).await;
    }
}

/// Parse one JSON-RPC frame, dispatch it, and serialize the reply.
pub(crate) async fn handle_message<H: RequestHandler>(text: &str, handler: &Arc<H>) -> String {
    let reply = match Call::parse(text) {
        Ok(call) => {
            let result = handler.handle_request(&call.method, call.params).await;
            Reply::new(call.id, result)
        }
        Err((id, fault)) => {
            debug!("Rejected frame: {fault}");
            Reply::fault(id, fault)
        }
    };
    reply.to_text()
}
