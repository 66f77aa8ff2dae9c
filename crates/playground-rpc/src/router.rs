//! RPC router: dispatches JSON-RPC requests to engine sub-interfaces.

use parking_lot::RwLock;
use playground_protocol::{CallResult, EngineInterface, RpcFault};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::server::RequestHandler;
use crate::service::Service;

/// Which engine sub-interfaces the listener exposes.
///
/// A sub-interface is exposed when `all` is set or its own flag is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceFlags {
    pub all: bool,
    pub config: bool,
    pub config_manager: bool,
    pub diagnostic: bool,
    pub engine: bool,
    pub product: bool,
}

impl InterfaceFlags {
    /// Every sub-interface exposed.
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn exposes(&self, interface: EngineInterface) -> bool {
        self.all
            || match interface {
                EngineInterface::Config => self.config,
                EngineInterface::ConfigManager => self.config_manager,
                EngineInterface::Diagnostic => self.diagnostic,
                EngineInterface::Engine => self.engine,
                EngineInterface::Product => self.product,
            }
    }

    /// Exposed sub-interfaces in canonical order.
    pub fn exposed(&self) -> Vec<EngineInterface> {
        EngineInterface::ALL
            .into_iter()
            .filter(|i| self.exposes(*i))
            .collect()
    }
}

/// The RPC router: owns the exposed services and routes requests.
pub struct RpcRouter {
    /// Registered services (boxed for object safety)
    services: Vec<Box<dyn ServiceDyn>>,
    /// Sub-interfaces this router is allowed to serve
    flags: InterfaceFlags,
    /// Router state
    state: RwLock<RouterState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    Uninitialized,
    Running,
    Shutdown,
}

/// Object-safe wrapper for the Service trait.
trait ServiceDyn: Send + Sync {
    fn namespace_dyn(&self) -> &str;
    fn handle_dyn<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CallResult> + Send + 'a>>;
    fn init_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send + '_>>;
    fn shutdown_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>>;
}

impl<T: Service> ServiceDyn for T {
    fn namespace_dyn(&self) -> &str {
        self.namespace()
    }
    fn handle_dyn<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CallResult> + Send + 'a>> {
        Box::pin(self.handle(method, params))
    }
    fn init_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send + '_>> {
        Box::pin(self.init())
    }
    fn shutdown_dyn(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}

impl RpcRouter {
    pub fn new(flags: InterfaceFlags) -> Self {
        Self {
            services: Vec::new(),
            flags,
            state: RwLock::new(RouterState::Uninitialized),
        }
    }

    pub fn flags(&self) -> InterfaceFlags {
        self.flags
    }

    /// Register a service with the router.
    ///
    /// Services for an engine sub-interface that the flags do not expose are
    /// dropped here; they are never initialized nor reachable. Namespaces
    /// outside the engine sub-interfaces are always kept.
    pub fn register_service<S: Service + 'static>(&mut self, service: S) -> bool {
        let namespace = service.namespace().to_string();
        if let Some(interface) = EngineInterface::from_namespace(&namespace) {
            if !self.flags.exposes(interface) {
                info!("Skipping disabled engine sub-interface: {namespace}");
                return false;
            }
        }
        info!("Registering engine sub-interface: {namespace}");
        self.services.push(Box::new(service));
        true
    }

    /// Namespaces currently served, in registration order.
    pub fn namespaces(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| s.namespace_dyn().to_string())
            .collect()
    }

    /// Initialize all services.
    pub async fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for service in &self.services {
            service.init_dyn().await?;
        }

        *self.state.write() = RouterState::Running;
        info!("RPC router initialized ({} sub-interfaces)", self.services.len());
        Ok(())
    }

    /// Shutdown all services.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == RouterState::Shutdown {
                return;
            }
            *state = RouterState::Shutdown;
        }

        for service in &self.services {
            service.shutdown_dyn().await;
        }

        info!("RPC router shutdown complete");
    }

    /// Route a request to the service owning its namespace.
    async fn route_request(&self, method: &str, params: Option<Value>) -> CallResult {
        let namespace = method.split('/').next().unwrap_or("");

        for service in &self.services {
            if service.namespace_dyn() == namespace {
                return service.handle_dyn(method, params).await;
            }
        }

        match EngineInterface::from_namespace(namespace) {
            Some(interface) if !self.flags.exposes(interface) => {
                debug!("Rejected {method}: sub-interface {interface} is disabled");
                Err(RpcFault::InterfaceDisabled(interface))
            }
            _ => Err(RpcFault::MethodNotFound(method.to_string())),
        }
    }
}

impl RequestHandler for RpcRouter {
    async fn handle_request(&self, method: &str, params: Option<Value>) -> CallResult {
        let state = *self.state.read();
        match state {
            RouterState::Shutdown => return Err(RpcFault::ShuttingDown),
            RouterState::Uninitialized => return Err(RpcFault::NotInitialized),
            RouterState::Running => {}
        }

        self.route_request(method, params).await
    }

    fn namespaces(&self) -> Vec<String> {
        RpcRouter::namespaces(self)
    }
}
