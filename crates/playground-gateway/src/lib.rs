//! Playground gateway.
//!
//! One HTTP listener that mounts a configurable set of sub-services under
//! URL prefixes, next to an RPC listener serving the engine sub-interfaces:
//! - `config`: the immutable enablement model and listener settings
//! - `adapter` / `proxy`: sub-services as routers, reverse proxying
//! - `dashboard`: derived status page
//! - `compose`: the routing table
//! - `launcher`: concurrent startup and joined shutdown of both listeners

pub mod adapter;
pub mod assets;
pub mod compose;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod launcher;
pub mod legacy;
pub mod proxy;
pub mod swagger;
pub mod xterm;

pub use adapter::{ServiceAdapter, ServiceDescriptor, SubService};
pub use compose::{RouteComposer, RoutingTable, compose};
pub use config::{
    EnableFlags, EngineSettings, GatewayConfig, RoutePrefixes, RpcSettings, Upstreams,
    XtermSettings,
};
pub use dashboard::{DashboardViewModel, ServiceStatus, StatusDashboard};
pub use error::{GatewayError, ProxyError, RenderError};
pub use http::{BoundHttpListener, HttpListener};
pub use launcher::{
    DualProtocolLauncher, LaunchPhase, LaunchReport, ListenerAddresses, ListenerOutcome,
    engine_router, serve,
};
pub use proxy::ReverseProxyAdapter;
