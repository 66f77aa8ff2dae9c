//! Status dashboard.
//!
//! Shows which sub-services are enabled and where they live. The state is
//! derived from configuration only; nothing is probed. Each request renders
//! a fresh view model through a Tera template from the bundle.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::header::HOST,
    response::Html,
};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use crate::adapter::ServiceAdapter;
use crate::assets::bundled_file;
use crate::config::{EnableFlags, RoutePrefixes, normalize_prefix};
use crate::error::RenderError;

/// Rendered colour for a reachable sub-service.
pub const STATUS_UP: &str = "green";
/// Rendered colour for an unreachable sub-service.
pub const STATUS_DOWN: &str = "red";

/// One dashboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: &'static str,
    pub prefix: String,
    pub enabled: bool,
    pub status: &'static str,
    /// Externally visible URL, empty when unreachable.
    pub url: String,
}

impl ServiceStatus {
    /// Reachable iff `all || flag`.
    pub fn derive(name: &'static str, prefix: &str, all: bool, flag: bool, request_host: &str) -> Self {
        let enabled = all || flag;
        Self {
            name,
            prefix: prefix.to_string(),
            enabled,
            status: if enabled { STATUS_UP } else { STATUS_DOWN },
            url: if enabled {
                format!("http://{request_host}/{prefix}")
            } else {
                String::new()
            },
        }
    }
}

/// Everything a dashboard template can reference.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardViewModel {
    pub html_title: String,
    pub request_host: String,
    pub services: Vec<ServiceStatus>,
    pub api: ServiceStatus,
    pub entity_search: ServiceStatus,
    pub swagger: ServiceStatus,
    pub xterm: ServiceStatus,
    pub jupyter: ServiceStatus,
}

/// Dashboard renderer. Holds only the flags, prefixes and title.
#[derive(Clone)]
pub struct StatusDashboard {
    flags: EnableFlags,
    prefixes: RoutePrefixes,
    html_title: String,
    overrides: Arc<HashMap<String, String>>,
}

impl StatusDashboard {
    pub fn new(flags: EnableFlags, prefixes: &RoutePrefixes, html_title: impl Into<String>) -> Self {
        let prefixes = RoutePrefixes {
            api: normalize_prefix(&prefixes.api),
            entity_search: normalize_prefix(&prefixes.entity_search),
            swagger: normalize_prefix(&prefixes.swagger),
            jupyter: normalize_prefix(&prefixes.jupyter),
            xterm: normalize_prefix(&prefixes.xterm),
        };
        Self {
            flags,
            prefixes,
            html_title: html_title.into(),
            overrides: Arc::new(HashMap::new()),
        }
    }

    /// Replace a bundled template, e.g. `site/index.html`.
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.overrides).insert(name.into(), source.into());
        self
    }

    pub fn view_model(&self, request_host: &str) -> DashboardViewModel {
        let all = self.flags.all;
        let p = &self.prefixes;
        let api = ServiceStatus::derive("REST API", &p.api, all, self.flags.rest_api, request_host);
        let entity_search = ServiceStatus::derive(
            "Entity Search",
            &p.entity_search,
            all,
            self.flags.entity_search,
            request_host,
        );
        let swagger = ServiceStatus::derive("Swagger UI", &p.swagger, all, self.flags.swagger_ui, request_host);
        let xterm = ServiceStatus::derive("Xterm", &p.xterm, all, self.flags.xterm, request_host);
        let jupyter = ServiceStatus::derive("JupyterLab", &p.jupyter, all, self.flags.jupyter_lab, request_host);

        DashboardViewModel {
            html_title: self.html_title.clone(),
            request_host: request_host.to_string(),
            services: vec![
                api.clone(),
                entity_search.clone(),
                swagger.clone(),
                xterm.clone(),
                jupyter.clone(),
            ],
            api,
            entity_search,
            swagger,
            xterm,
            jupyter,
        }
    }

    fn template_source(&self, name: &str) -> Option<String> {
        if let Some(source) = self.overrides.get(name) {
            return Some(source.clone());
        }
        bundled_file(&format!("templates/{name}"))
            .and_then(|f| f.contents_utf8())
            .map(str::to_string)
    }

    /// Render template `name` (relative to `templates/`) for a request host.
    pub fn render(&self, name: &str, request_host: &str) -> Result<String, RenderError> {
        let source = self
            .template_source(name)
            .ok_or_else(|| RenderError::NotFound(name.to_string()))?;
        let view = self.view_model(request_host);
        render_template(name, &source, &view)
    }
}

/// Render a one-off Tera template against a serializable view.
pub fn render_template<T: Serialize>(name: &str, source: &str, view: &T) -> Result<String, RenderError> {
    let failed = |source| RenderError::Template {
        name: name.to_string(),
        source,
    };
    let context = Context::from_serialize(view).map_err(failed)?;
    let autoescape = name.ends_with(".html") || name.ends_with(".htm");
    Tera::one_off(source, &context, autoescape).map_err(failed)
}

/// Template name for a request path: `/site/` → `site/index.html`.
pub fn template_name(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{trimmed}index.html")
    } else {
        trimmed.to_string()
    }
}

/// Host the client addressed, taken verbatim.
pub fn request_host(req: &Request) -> String {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

impl ServiceAdapter for StatusDashboard {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    fn into_router(self) -> Router {
        Router::new().fallback(dashboard_handler).with_state(self)
    }
}

async fn dashboard_handler(
    State(dashboard): State<StatusDashboard>,
    req: Request,
) -> Result<Html<String>, RenderError> {
    let name = template_name(req.uri().path());
    let host = request_host(&req);
    debug!("Rendering dashboard template {name} for host {host}");
    dashboard.render(&name, &host).map(Html)
}
