//! End-to-end tests: both listeners started through the launcher on
//! OS-assigned ports, driven over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use playground_gateway::{
    DualProtocolLauncher, EnableFlags, GatewayConfig, LaunchPhase, LaunchReport, ListenerOutcome,
    compose, engine_router,
};
use playground_protocol::Methods;
use playground_rpc::InterfaceFlags;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct RunningGateway {
    http: SocketAddr,
    rpc: SocketAddr,
    phase: watch::Receiver<LaunchPhase>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<LaunchReport>,
}

impl RunningGateway {
    async fn stop(self) -> LaunchReport {
        let _ = self.stop.send(());
        timeout(Duration::from_secs(15), self.task)
            .await
            .expect("launcher did not stop")
            .unwrap()
    }
}

async fn start_gateway(mut config: GatewayConfig) -> RunningGateway {
    config.server_address = "127.0.0.1".into();
    config.http_port = 0;
    config.rpc.port = 0;
    config.tty_only = true;

    let router = engine_router(&config);
    router.initialize().await.unwrap();
    let table = compose(&config).unwrap();
    let launcher = DualProtocolLauncher::new(&config, table, Arc::new(router));
    let phase = launcher.phase();
    let mut addresses = launcher.addresses();

    let (stop, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(launcher.serve_with_shutdown(async move {
        let _ = stop_rx.await;
    }));

    let bound = *timeout(
        Duration::from_secs(5),
        addresses.wait_for(|a| a.http.is_some() && a.rpc.is_some()),
    )
    .await
    .expect("listeners did not bind")
    .unwrap();

    RunningGateway {
        http: bound.http.unwrap(),
        rpc: bound.rpc.unwrap(),
        phase,
        stop,
        task,
    }
}

async fn next_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn full_gateway_serves_http_and_rpc() {
    let mut config = GatewayConfig::default();
    config.enable = EnableFlags {
        swagger_ui: true,
        entity_search: true,
        ..EnableFlags::default()
    };
    config.rpc.interfaces = InterfaceFlags {
        product: true,
        ..InterfaceFlags::default()
    };
    config.engine.instance_name = "e2e".into();
    let gateway = start_gateway(config).await;
    let http = gateway.http;

    assert_eq!(*gateway.phase.borrow(), LaunchPhase::Running);

    // HTTP side.
    let dashboard = reqwest::get(format!("http://{http}/site/")).await.unwrap();
    assert_eq!(dashboard.status(), 200);
    let body = dashboard.text().await.unwrap();
    assert!(body.contains("status green"));
    assert!(body.contains(&http.to_string()));

    let spec: Value = reqwest::get(format!("http://{http}/swagger/swagger_spec"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(spec["servers"][0]["url"], format!("http://{http}/api"));

    let ui = reqwest::get(format!("http://{http}/entity-search/")).await.unwrap();
    assert_eq!(ui.status(), 200);

    let root = reqwest::get(format!("http://{http}/")).await.unwrap();
    assert_eq!(root.status(), 200);

    // RPC side.
    let health: Value = reqwest::get(format!("http://{}/health", gateway.rpc))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["namespaces"], json!(["product"]));

    let (mut ws, _) = connect_async(format!("ws://{}/rpc", gateway.rpc)).await.unwrap();
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["method"], "server/connected");

    let req = json!({"jsonrpc": "2.0", "id": 1, "method": Methods::PRODUCT_GET_VERSION});
    ws.send(Message::Text(req.to_string().into())).await.unwrap();
    let resp = next_json(&mut ws).await;
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"]["instanceName"], "e2e");

    let req = json!({"jsonrpc": "2.0", "id": 2, "method": Methods::DIAGNOSTIC_CHECK_HEALTH});
    ws.send(Message::Text(req.to_string().into())).await.unwrap();
    let resp = next_json(&mut ws).await;
    assert_eq!(resp["id"], 2);
    assert_eq!(resp["error"]["code"], -32003);

    let req = json!({"jsonrpc": "2.0", "id": 3, "method": "nosuch/thing"});
    ws.send(Message::Text(req.to_string().into())).await.unwrap();
    let resp = next_json(&mut ws).await;
    assert_eq!(resp["error"]["code"], -32601);

    ws.close(None).await.unwrap();

    let report = gateway.stop().await;
    assert!(matches!(report.http, ListenerOutcome::Stopped));
    assert!(matches!(report.rpc, ListenerOutcome::Stopped));
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn enable_all_exposes_every_sub_service() {
    let mut config = GatewayConfig::default();
    config.enable = EnableFlags::everything();
    config.rpc.interfaces = InterfaceFlags::everything();
    config.xterm.command = "/bin/cat".into();
    let gateway = start_gateway(config).await;
    let http = gateway.http;

    for page in ["/swagger/", "/entity-search/", "/xterm/", "/site/"] {
        let resp = reqwest::get(format!("http://{http}{page}")).await.unwrap();
        assert_eq!(resp.status(), 200, "{page}");
    }

    // Proxied mounts answer even with nothing upstream: 502 rather than 404.
    for page in ["/api/heartbeat", "/entity-search/api/heartbeat", "/jupyter/lab"] {
        let resp = reqwest::get(format!("http://{http}{page}")).await.unwrap();
        assert_ne!(resp.status(), 404, "{page}");
    }

    let health: Value = reqwest::get(format!("http://{}/health", gateway.rpc))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["namespaces"], json!(["product", "diagnostic"]));

    let report = gateway.stop().await;
    assert!(report.is_success());
}

#[tokio::test]
async fn shutdown_drains_and_releases_ports() {
    let gateway = start_gateway(GatewayConfig::default()).await;
    let (http, rpc) = (gateway.http, gateway.rpc);
    let mut phase = gateway.phase.clone();

    let report = gateway.stop().await;
    assert!(report.is_success());
    timeout(
        Duration::from_secs(1),
        phase.wait_for(|p| *p == LaunchPhase::Stopped),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(reqwest::get(format!("http://{http}/site/")).await.is_err());
    assert!(reqwest::get(format!("http://{rpc}/health")).await.is_err());
}
