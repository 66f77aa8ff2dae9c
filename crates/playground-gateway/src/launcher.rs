//! Dual-protocol launch.
//!
//! Starts the HTTP listener and the RPC listener as two independent tasks
//! and waits for both. A failure in one is recorded in the report and never
//! cancels the other. In dry-run mode both listeners are constructed and
//! nothing is bound.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use playground_rpc::{
    DiagnosticService, ProductService, RequestHandler, RpcListener, RpcListenerConfig, RpcRouter,
};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::compose::RoutingTable;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::HttpListener;

/// Lifecycle of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPhase {
    Idle,
    Starting,
    Running,
    Stopped,
    Failed,
}

/// How one listener ended.
#[derive(Debug)]
pub enum ListenerOutcome {
    /// Dry run; nothing was bound.
    NotStarted,
    /// Served and stopped cleanly.
    Stopped,
    Failed(GatewayError),
}

impl ListenerOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Addresses the listeners actually bound, filled in as each one binds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerAddresses {
    pub http: Option<SocketAddr>,
    pub rpc: Option<SocketAddr>,
}

/// Both listener outcomes from one launch.
#[derive(Debug)]
pub struct LaunchReport {
    pub http: ListenerOutcome,
    pub rpc: ListenerOutcome,
}

impl LaunchReport {
    fn dry_run() -> Self {
        Self {
            http: ListenerOutcome::NotStarted,
            rpc: ListenerOutcome::NotStarted,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.http.is_failed() && !self.rpc.is_failed()
    }

    /// Names of the listeners that failed.
    pub fn failed_listeners(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if self.http.is_failed() {
            failed.push("http");
        }
        if self.rpc.is_failed() {
            failed.push("rpc");
        }
        failed
    }

    /// `Ok` unless at least one listener failed.
    pub fn into_result(self) -> Result<(), GatewayError> {
        let failed: Vec<String> = [("http", self.http), ("rpc", self.rpc)]
            .into_iter()
            .filter_map(|(name, outcome)| match outcome {
                ListenerOutcome::Failed(e) => Some(format!("{name}: {e}")),
                _ => None,
            })
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ListenersFailed { failed })
        }
    }
}

/// RPC router exposing the sub-interfaces the configuration enables, with
/// the built-in `product` and `diagnostic` providers registered.
pub fn engine_router(config: &GatewayConfig) -> RpcRouter {
    let mut router = RpcRouter::new(config.rpc.interfaces);
    router.register_service(ProductService::new(config.engine.instance_name.clone()));
    router.register_service(DiagnosticService::new(config.engine.instance_name.clone()));
    router
}

/// Runs the HTTP and RPC listeners side by side.
pub struct DualProtocolLauncher<H: RequestHandler> {
    http: HttpListener,
    rpc: RpcListener<H>,
    tty_only: bool,
    avoid_serving: bool,
    browser_url: String,
    phase: Arc<watch::Sender<LaunchPhase>>,
    addresses: Arc<watch::Sender<ListenerAddresses>>,
}

impl<H: RequestHandler> DualProtocolLauncher<H> {
    pub fn new(config: &GatewayConfig, table: RoutingTable, handler: Arc<H>) -> Self {
        let http = HttpListener::new(
            config.http_address(),
            table.into_router(),
            config.read_header_timeout,
        );
        let rpc = RpcListener::new(
            RpcListenerConfig {
                port: config.rpc.port,
                hostname: config.server_address.clone(),
                max_connections: config.rpc.max_connections,
                verbose_logging: config.engine.verbose_logging,
            },
            handler,
        );
        let (phase, _) = watch::channel(LaunchPhase::Idle);
        let (addresses, _) = watch::channel(ListenerAddresses::default());

        Self {
            http,
            rpc,
            tty_only: config.tty_only,
            avoid_serving: config.avoid_serving,
            browser_url: config.browser_url(),
            phase: Arc::new(phase),
            addresses: Arc::new(addresses),
        }
    }

    pub fn phase(&self) -> watch::Receiver<LaunchPhase> {
        self.phase.subscribe()
    }

    pub fn addresses(&self) -> watch::Receiver<ListenerAddresses> {
        self.addresses.subscribe()
    }

    /// Serve until both listeners stop on their own.
    pub async fn serve(self) -> LaunchReport {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves (or both listeners stop), then drain
    /// both and report.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> LaunchReport
    where
        F: Future<Output = ()> + Send,
    {
        self.phase.send_replace(LaunchPhase::Starting);

        if self.avoid_serving {
            info!(
                "Dry run: HTTP {} and RPC {} constructed, not serving",
                self.http.address(),
                self.rpc.address()
            );
            self.phase.send_replace(LaunchPhase::Stopped);
            return LaunchReport::dry_run();
        }

        let (stop_tx, stop_rx) = watch::channel(false);

        let http = self.http;
        let http_phase = self.phase.clone();
        let http_addresses = self.addresses.clone();
        let http_stop = stop_signal(stop_rx.clone());
        let http_task = tokio::spawn(async move {
            let bound = http.bind().await?;
            mark_running(&http_phase);
            http_addresses.send_modify(|a| a.http = Some(bound.local_addr()));
            bound.serve(http_stop).await
        });

        let rpc = self.rpc;
        let rpc_phase = self.phase.clone();
        let rpc_addresses = self.addresses.clone();
        let rpc_stop = stop_signal(stop_rx);
        let rpc_task = tokio::spawn(async move {
            let bound = rpc.bind().await?;
            mark_running(&rpc_phase);
            rpc_addresses.send_modify(|a| a.rpc = Some(bound.local_addr()));
            bound.serve(rpc_stop).await.map_err(GatewayError::from)
        });

        if !self.tty_only {
            let url = self.browser_url.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = open::that(&url) {
                    warn!("Could not open a browser at {url}: {e}");
                }
            });
        }

        let joined = async { tokio::join!(http_task, rpc_task) };
        tokio::pin!(joined);
        tokio::pin!(shutdown);

        let (http_joined, rpc_joined) = tokio::select! {
            results = &mut joined => results,
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping both listeners");
                let _ = stop_tx.send(true);
                (&mut joined).await
            }
        };

        let report = LaunchReport {
            http: outcome("http", http_joined),
            rpc: outcome("rpc", rpc_joined),
        };
        let phase = if report.is_success() {
            LaunchPhase::Stopped
        } else {
            LaunchPhase::Failed
        };
        self.phase.send_replace(phase);
        report
    }
}

/// `Running` means at least one listener holds its socket. A launch where
/// neither binds goes straight from `Starting` to `Failed`.
fn mark_running(phase: &watch::Sender<LaunchPhase>) {
    phase.send_if_modified(|p| {
        let first = *p == LaunchPhase::Starting;
        if first {
            *p = LaunchPhase::Running;
        }
        first
    });
}

fn stop_signal(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

fn outcome(
    listener: &'static str,
    joined: Result<Result<(), GatewayError>, JoinError>,
) -> ListenerOutcome {
    match joined {
        Ok(Ok(())) => ListenerOutcome::Stopped,
        Ok(Err(e)) => {
            error!("{listener} listener failed: {e}");
            ListenerOutcome::Failed(e)
        }
        Err(join) => {
            error!("{listener} listener task aborted: {join}");
            ListenerOutcome::Failed(GatewayError::ListenerPanicked { listener })
        }
    }
}

/// Compose-and-launch convenience: build the engine router from `config`,
/// serve `table` next to it, and fold the report into one result.
pub async fn serve(config: &GatewayConfig, table: RoutingTable) -> Result<(), GatewayError> {
    let router = engine_router(config);
    router
        .initialize()
        .await
        .map_err(|e| GatewayError::RpcInit(e.to_string()))?;
    let router = Arc::new(router);
    let report = DualProtocolLauncher::new(config, table, router.clone())
        .serve()
        .await;
    router.shutdown().await;
    report.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose;

    fn dry_run_config() -> GatewayConfig {
        GatewayConfig {
            avoid_serving: true,
            tty_only: true,
            server_address: "127.0.0.1".into(),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn dry_run_binds_nothing() {
        let config = dry_run_config();
        let table = compose(&config).unwrap();
        let launcher = DualProtocolLauncher::new(&config, table, Arc::new(engine_router(&config)));
        let phase = launcher.phase();
        let addresses = launcher.addresses();

        let report = launcher.serve().await;
        assert!(matches!(report.http, ListenerOutcome::NotStarted));
        assert!(matches!(report.rpc, ListenerOutcome::NotStarted));
        assert_eq!(*phase.borrow(), LaunchPhase::Stopped);
        assert_eq!(*addresses.borrow(), ListenerAddresses::default());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn never_running_when_neither_listener_binds() {
        let http_taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let rpc_taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = GatewayConfig {
            tty_only: true,
            server_address: "127.0.0.1".into(),
            http_port: http_taken.local_addr().unwrap().port(),
            rpc: crate::config::RpcSettings {
                port: rpc_taken.local_addr().unwrap().port(),
                ..Default::default()
            },
            ..GatewayConfig::default()
        };
        let table = compose(&config).unwrap();
        let launcher = DualProtocolLauncher::new(&config, table, Arc::new(engine_router(&config)));

        let mut phase = launcher.phase();
        let observer = tokio::spawn(async move {
            let mut seen = vec![*phase.borrow_and_update()];
            while phase.changed().await.is_ok() {
                seen.push(*phase.borrow_and_update());
            }
            seen
        });

        let report = launcher.serve().await;
        assert!(report.http.is_failed());
        assert!(report.rpc.is_failed());

        let seen = observer.await.unwrap();
        assert!(!seen.contains(&LaunchPhase::Running), "{seen:?}");
        assert_eq!(seen.last(), Some(&LaunchPhase::Failed));
    }

    #[tokio::test]
    async fn free_serve_returns_in_dry_run() {
        let config = dry_run_config();
        let table = compose(&config).unwrap();
        serve(&config, table).await.unwrap();
    }

    #[test]
    fn report_names_failed_listener() {
        let report = LaunchReport {
            http: ListenerOutcome::Failed(GatewayError::ListenerPanicked { listener: "http" }),
            rpc: ListenerOutcome::Stopped,
        };
        assert_eq!(report.failed_listeners(), vec!["http"]);
        match report.into_result() {
            Err(GatewayError::ListenersFailed { failed }) => {
                assert_eq!(failed.len(), 1);
                assert!(failed[0].starts_with("http: "));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn engine_router_respects_interface_flags() {
        let mut config = GatewayConfig::default();
        config.rpc.interfaces.product = true;
        assert_eq!(engine_router(&config).namespaces(), vec!["product"]);

        config.rpc.interfaces.all = true;
        assert_eq!(engine_router(&config).namespaces(), vec!["product", "diagnostic"]);
    }
}
