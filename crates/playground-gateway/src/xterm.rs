//! Terminal over WebSocket.
//!
//! `GET /` serves the terminal page; `GET /ws` upgrades to a WebSocket and
//! spawns one child process per connection. Child stdout and stderr are
//! streamed to the socket as binary frames, socket frames are written to the
//! child's stdin. The child is killed when the socket closes.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header::HOST},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::ServiceAdapter;
use crate::assets::EmbeddedAssets;
use crate::config::{EngineSettings, XtermSettings};

/// Environment variable carrying the engine settings into the child.
pub const ENGINE_CONFIGURATION_ENV: &str = "SENZING_ENGINE_CONFIGURATION_JSON";

/// Terminal session manager.
#[derive(Clone)]
pub struct XtermService {
    inner: Arc<XtermInner>,
}

struct XtermInner {
    settings: XtermSettings,
    engine: EngineSettings,
}

impl XtermService {
    pub fn new(settings: XtermSettings, engine: EngineSettings) -> Self {
        Self {
            inner: Arc::new(XtermInner { settings, engine }),
        }
    }

    /// An empty allow-list admits every host.
    pub fn is_allowed_host(&self, hostname: &str) -> bool {
        let allowed = &self.inner.settings.allowed_hostnames;
        allowed.is_empty() || allowed.iter().any(|h| h.eq_ignore_ascii_case(hostname))
    }

    fn command(&self) -> Command {
        let settings = &self.inner.settings;
        let mut cmd = Command::new(&settings.command);
        cmd.args(&settings.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.inner.engine.settings_json.is_empty() {
            cmd.env(ENGINE_CONFIGURATION_ENV, &self.inner.engine.settings_json);
        }
        cmd
    }
}

impl ServiceAdapter for XtermService {
    fn name(&self) -> &'static str {
        "xterm"
    }

    fn into_router(self) -> Router {
        Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .with_state(self)
            .fallback_service(EmbeddedAssets::new("xterm", "xterm").into_router())
    }
}

/// Host header without its port. Bracketed IPv6 literals lose the brackets.
pub fn hostname_of(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

async fn ws_upgrade_handler(
    State(service): State<XtermService>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let hostname = hostname_of(host);
    if !service.is_allowed_host(hostname) {
        warn!("Terminal connection refused for host {hostname:?}");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, service))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive failures; any success resets the count.
#[derive(Debug)]
pub struct ErrorBudget {
    limit: u32,
    consecutive: u32,
}

impl ErrorBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    /// Record an outcome. Returns true once the limit is reached.
    pub fn record(&mut self, ok: bool) -> bool {
        if ok {
            self.consecutive = 0;
        } else {
            self.consecutive += 1;
        }
        self.consecutive >= self.limit
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn pump_output<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Bytes>, chunk: usize) {
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn write_input(stdin: &mut Option<ChildStdin>, data: &[u8]) -> bool {
    match stdin {
        Some(pipe) => pipe.write_all(data).await.is_ok() && pipe.flush().await.is_ok(),
        None => false,
    }
}

async fn run_session(socket: WebSocket, service: XtermService) {
    let settings = &service.inner.settings;
    let session_id = uuid::Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut child = match service.command().spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn terminal command {:?}: {e}", settings.command);
            let _ = ws_tx
                .send(Message::Text(format!("failed to start {}: {e}\r\n", settings.command).into()))
                .await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    info!("Terminal session {session_id} started ({})", settings.command);

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(64);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_output(stdout, out_tx.clone(), settings.max_buffer_size_bytes));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_output(stderr, out_tx.clone(), settings.max_buffer_size_bytes));
    }
    drop(out_tx);
    let mut stdin = child.stdin.take();

    let mut ping = (settings.keepalive_ping_timeout > 0).then(|| {
        let period = Duration::from_secs(settings.keepalive_ping_timeout);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut awaiting_pong = false;
    let mut errors = ErrorBudget::new(settings.connection_error_limit);

    loop {
        tokio::select! {
            chunk = out_rx.recv() => match chunk {
                Some(bytes) => {
                    let ok = ws_tx.send(Message::Binary(bytes)).await.is_ok();
                    if errors.record(ok) {
                        warn!("Terminal session {session_id}: too many write errors");
                        break;
                    }
                }
                None => {
                    debug!("Terminal session {session_id}: child output closed");
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if errors.record(write_input(&mut stdin, text.as_bytes()).await) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if errors.record(write_input(&mut stdin, &data).await) {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Terminal session {session_id}: socket error: {e}");
                    if errors.record(false) {
                        break;
                    }
                }
            },
            _ = next_tick(&mut ping) => {
                if awaiting_pong {
                    warn!("Terminal session {session_id}: keepalive timed out");
                    break;
                }
                awaiting_pong = true;
                let ok = ws_tx.send(Message::Ping(Bytes::new())).await.is_ok();
                if errors.record(ok) {
                    break;
                }
            }
        }
    }

    drop(stdin);
    let _ = child.start_kill();
    let _ = child.wait().await;
    let _ = ws_tx.send(Message::Close(None)).await;
    info!("Terminal session {session_id} closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_strips_port() {
        assert_eq!(hostname_of("localhost:8261"), "localhost");
        assert_eq!(hostname_of("localhost"), "localhost");
        assert_eq!(hostname_of("[::1]:8261"), "::1");
        assert_eq!(hostname_of("10.0.0.5:80"), "10.0.0.5");
    }

    #[test]
    fn allow_list() {
        let mut settings = XtermSettings::default();
        settings.allowed_hostnames = vec!["localhost".into(), "10.0.0.5".into()];
        let service = XtermService::new(settings.clone(), EngineSettings::default());
        assert!(service.is_allowed_host("LOCALHOST"));
        assert!(service.is_allowed_host("10.0.0.5"));
        assert!(!service.is_allowed_host("evil.example"));

        settings.allowed_hostnames.clear();
        let open = XtermService::new(settings, EngineSettings::default());
        assert!(open.is_allowed_host("anything"));
    }

    #[test]
    fn error_budget_counts_consecutive_failures() {
        let mut budget = ErrorBudget::new(3);
        assert!(!budget.record(false));
        assert!(!budget.record(false));
        assert!(!budget.record(true));
        assert!(!budget.record(false));
        assert!(!budget.record(false));
        assert!(budget.record(false));

        let mut strict = ErrorBudget::new(0);
        assert!(strict.record(false));
    }
}
