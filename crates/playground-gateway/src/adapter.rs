//! Sub-services and the adapter seam they are mounted through.
//!
//! A `ServiceAdapter` turns something external (an upstream process, an
//! embedded bundle, a terminal session manager) into an axum `Router` that
//! serves one sub-tree of the URL space. The composer never looks inside an
//! adapter; it only decides whether and where to mount it.

use axum::Router;

use crate::config::{EnableFlags, RoutePrefixes, mount_key, normalize_prefix};
use crate::error::GatewayError;

/// Uniform "handle requests under a prefix" capability.
pub trait ServiceAdapter: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce the handler serving this adapter's sub-tree. Paths it sees
    /// are relative to its mount point unless the mount keeps the prefix.
    fn into_router(self) -> Router;
}

/// Every conditionally mounted sub-service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubService {
    RestApi,
    EntitySearchApi,
    EntitySearchUi,
    SwaggerUi,
    JupyterLab,
    Xterm,
}

impl SubService {
    /// Mount order.
    pub const PRIORITY: [SubService; 6] = [
        Self::RestApi,
        Self::EntitySearchApi,
        Self::EntitySearchUi,
        Self::SwaggerUi,
        Self::JupyterLab,
        Self::Xterm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RestApi => "rest-api",
            Self::EntitySearchApi => "entity-search-api",
            Self::EntitySearchUi => "entity-search",
            Self::SwaggerUi => "swagger-ui",
            Self::JupyterLab => "jupyter-lab",
            Self::Xterm => "xterm",
        }
    }

    /// The legacy API proxy also backs entity search, so it stays up when
    /// only entity search is enabled.
    pub fn is_enabled(&self, flags: &EnableFlags) -> bool {
        flags.all
            || match self {
                Self::RestApi => flags.rest_api,
                Self::EntitySearchApi => flags.rest_api || flags.entity_search,
                Self::EntitySearchUi => flags.entity_search,
                Self::SwaggerUi => flags.swagger_ui,
                Self::JupyterLab => flags.jupyter_lab,
                Self::Xterm => flags.xterm,
            }
    }

    /// Normalized prefix, without surrounding slashes.
    pub fn prefix(&self, prefixes: &RoutePrefixes) -> String {
        match self {
            Self::RestApi => normalize_prefix(&prefixes.api),
            Self::EntitySearchApi => {
                let base = normalize_prefix(&prefixes.entity_search);
                if base.is_empty() {
                    base
                } else {
                    format!("{base}/api")
                }
            }
            Self::EntitySearchUi => normalize_prefix(&prefixes.entity_search),
            Self::SwaggerUi => normalize_prefix(&prefixes.swagger),
            Self::JupyterLab => normalize_prefix(&prefixes.jupyter),
            Self::Xterm => normalize_prefix(&prefixes.xterm),
        }
    }

    /// The notebook server is started with its base URL set to the mount
    /// prefix, so it receives the full path.
    pub fn strips_prefix(&self) -> bool {
        !matches!(self, Self::JupyterLab)
    }
}

impl std::fmt::Display for SubService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Deferred construction of an adapter's router.
pub type HandlerFactory = Box<dyn FnOnce() -> Result<Router, GatewayError> + Send>;

/// A sub-service ready to be mounted: where, whether, and how to build it.
pub struct ServiceDescriptor {
    service: SubService,
    prefix: String,
    enabled: bool,
    factory: HandlerFactory,
}

impl ServiceDescriptor {
    pub fn new(
        service: SubService,
        prefixes: &RoutePrefixes,
        flags: &EnableFlags,
        factory: HandlerFactory,
    ) -> Self {
        Self {
            service,
            prefix: mount_key(&service.prefix(prefixes)),
            enabled: service.is_enabled(flags),
            factory,
        }
    }

    /// Wrap an adapter so it is only constructed when mounted.
    pub fn for_adapter<A, F>(
        service: SubService,
        prefixes: &RoutePrefixes,
        flags: &EnableFlags,
        make: F,
    ) -> Self
    where
        A: ServiceAdapter,
        F: FnOnce() -> Result<A, GatewayError> + Send + 'static,
    {
        Self::new(
            service,
            prefixes,
            flags,
            Box::new(move || make().map(ServiceAdapter::into_router)),
        )
    }

    pub fn service(&self) -> SubService {
        self.service
    }

    pub fn name(&self) -> &'static str {
        self.service.name()
    }

    /// Mount key, `/prefix/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run the factory.
    pub fn build(self) -> Result<Router, GatewayError> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service", &self.service)
            .field("prefix", &self.prefix)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
