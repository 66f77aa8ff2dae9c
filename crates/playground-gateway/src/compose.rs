//! Route composition.
//!
//! Turns the enablement model into a `RoutingTable`: one mount per enabled
//! sub-service in priority order, then the dashboard at `/site/` and the
//! static bundle at `/`. Dispatch picks the longest mounted prefix that the
//! request path starts with and, for most mounts, strips that prefix before
//! handing the request to the adapter.

use std::sync::Arc;

use axum::{
    Router,
    extract::{OriginalUri, Request, State},
    http::{StatusCode, Uri, header::LOCATION, uri::PathAndQuery},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::adapter::{ServiceAdapter, ServiceDescriptor, SubService};
use crate::assets::{EmbeddedAssets, root_router};
use crate::config::{DASHBOARD_PREFIX, GatewayConfig, mount_key};
use crate::dashboard::StatusDashboard;
use crate::error::GatewayError;
use crate::legacy::LegacyProcess;
use crate::proxy::ReverseProxyAdapter;
use crate::swagger::SwaggerUi;
use crate::xterm::XtermService;

/// One mounted handler.
pub struct Mount {
    name: &'static str,
    prefix: String,
    strip: bool,
    router: Router,
}

impl Mount {
    pub fn new(name: &'static str, prefix: impl Into<String>, strip: bool, router: Router) -> Self {
        Self {
            name,
            prefix: prefix.into(),
            strip,
            router,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn strips_prefix(&self) -> bool {
        self.strip
    }
}

/// Prefix → handler table, read-only once built.
pub struct RoutingTable {
    mounts: Vec<Mount>,
    legacy: Option<LegacyProcess>,
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("mounts", &self.mounts())
            .field("legacy", &self.legacy)
            .finish()
    }
}

impl RoutingTable {
    /// `(name, prefix)` pairs in mount order.
    pub fn mounts(&self) -> Vec<(&'static str, &str)> {
        self.mounts.iter().map(|m| (m.name, m.prefix.as_str())).collect()
    }

    /// Mount prefixes in mount order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.mounts.iter().map(|m| m.prefix.as_str()).collect()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.mounts.iter().any(|m| m.prefix == prefix)
    }

    pub fn legacy_process(&self) -> Option<&LegacyProcess> {
        self.legacy.as_ref()
    }

    /// Longest mounted prefix that `path` starts with.
    pub fn lookup(&self, path: &str) -> Option<&Mount> {
        self.mounts
            .iter()
            .filter(|m| path.starts_with(m.prefix.as_str()))
            .max_by_key(|m| m.prefix.len())
    }

    /// Mount whose prefix is `path` plus a trailing slash.
    fn slash_redirect(&self, path: &str) -> Option<&Mount> {
        if path.ends_with('/') {
            return None;
        }
        self.mounts
            .iter()
            .find(|m| m.prefix.strip_suffix('/') == Some(path))
    }

    /// The axum app serving this table, with request tracing.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }
}

fn with_path(uri: &Uri, path: &str) -> Result<Uri, StatusCode> {
    let pq = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(pq).map_err(|_| StatusCode::BAD_REQUEST)?);
    Uri::from_parts(parts).map_err(|_| StatusCode::BAD_REQUEST)
}

async fn dispatch(State(table): State<Arc<RoutingTable>>, mut req: Request) -> Response {
    let path = req.uri().path().to_string();

    if let Some(mount) = table.slash_redirect(&path) {
        let location = match req.uri().query() {
            Some(q) => format!("{}?{q}", mount.prefix),
            None => mount.prefix.clone(),
        };
        return (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response();
    }

    let Some(mount) = table.lookup(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if mount.strip {
        let rest = &path[mount.prefix.len() - 1..];
        let original = req.uri().clone();
        match with_path(&original, rest) {
            Ok(uri) => *req.uri_mut() = uri,
            Err(status) => return status.into_response(),
        }
        if req.extensions().get::<OriginalUri>().is_none() {
            req.extensions_mut().insert(OriginalUri(original));
        }
    }
    debug!("{path} -> {} ({})", mount.name, req.uri());

    match mount.router.clone().oneshot(req).await {
        Ok(response) => response,
        Err(e) => match e {},
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composer
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the routing table from a configuration.
pub struct RouteComposer<'a> {
    config: &'a GatewayConfig,
    dashboard: StatusDashboard,
}

impl<'a> RouteComposer<'a> {
    pub fn new(config: &'a GatewayConfig) -> Self {
        let dashboard = StatusDashboard::new(config.enable, &config.prefixes, config.html_title.clone());
        Self { config, dashboard }
    }

    /// Override one dashboard template.
    pub fn with_dashboard_template(mut self, name: &str, source: &str) -> Self {
        self.dashboard = self.dashboard.with_template(name, source);
        self
    }

    /// One descriptor per sub-service, in priority order.
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        let config = self.config;
        let prefixes = &config.prefixes;
        let flags = &config.enable;

        SubService::PRIORITY
            .into_iter()
            .map(|service| {
                let name = service.name();
                match service {
                    SubService::RestApi | SubService::EntitySearchApi => {
                        let upstream = config.upstreams.legacy_api.clone();
                        ServiceDescriptor::for_adapter(service, prefixes, flags, move || {
                            ReverseProxyAdapter::named(name, &upstream)
                        })
                    }
                    SubService::EntitySearchUi => {
                        ServiceDescriptor::for_adapter(service, prefixes, flags, || {
                            Ok(EmbeddedAssets::entity_search())
                        })
                    }
                    SubService::SwaggerUi => {
                        let spec = config.open_api_specification.clone();
                        ServiceDescriptor::for_adapter(service, prefixes, flags, move || {
                            Ok(SwaggerUi::new(spec.as_deref()))
                        })
                    }
                    SubService::JupyterLab => {
                        let upstream = config.upstreams.jupyter_lab.clone();
                        ServiceDescriptor::for_adapter(service, prefixes, flags, move || {
                            ReverseProxyAdapter::named(name, &upstream)
                        })
                    }
                    SubService::Xterm => {
                        let settings = config.xterm.clone();
                        let engine = config.engine.clone();
                        ServiceDescriptor::for_adapter(service, prefixes, flags, move || {
                            Ok(XtermService::new(settings, engine))
                        })
                    }
                }
            })
            .collect()
    }

    /// Validate, run every enabled factory, and add the fixed mounts. Any
    /// failure aborts the whole composition.
    pub fn compose(self) -> Result<RoutingTable, GatewayError> {
        self.config.validate()?;

        let mut mounts = Vec::new();
        let mut proxies_legacy = false;
        for descriptor in self.descriptors() {
            if !descriptor.is_enabled() {
                debug!("Sub-service {} disabled", descriptor.name());
                continue;
            }
            let service = descriptor.service();
            proxies_legacy |= matches!(service, SubService::RestApi | SubService::EntitySearchApi);
            let prefix = descriptor.prefix().to_string();
            let router = descriptor.build()?;
            info!("Mounted {} at {prefix}", service.name());
            mounts.push(Mount::new(service.name(), prefix, service.strips_prefix(), router));
        }

        let dashboard_prefix = mount_key(DASHBOARD_PREFIX);
        info!("Mounted dashboard at {dashboard_prefix}");
        mounts.push(Mount::new(
            "dashboard",
            dashboard_prefix,
            false,
            self.dashboard.into_router(),
        ));
        mounts.push(Mount::new(
            "static",
            "/",
            false,
            root_router(self.config.static_root_dir.as_ref())?,
        ));

        let command = &self.config.upstreams.legacy_api_command;
        let legacy = if proxies_legacy && !command.is_empty() {
            Some(LegacyProcess::spawn(command, &self.config.engine)?)
        } else {
            None
        };

        Ok(RoutingTable { mounts, legacy })
    }
}

/// Compose the routing table for `config`.
pub fn compose(config: &GatewayConfig) -> Result<RoutingTable, GatewayError> {
    RouteComposer::new(config).compose()
}
