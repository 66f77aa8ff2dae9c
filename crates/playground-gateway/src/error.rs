//! Error types for composition, launch, rendering and proxying.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use playground_rpc::TransportError;
use tracing::{error, warn};

/// Errors that stop the gateway from starting or report a failed listener.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("sub-service {service} has an empty URL prefix")]
    EmptyPrefix { service: &'static str },

    #[error("URL prefix {prefix:?} of {service} is reserved")]
    ReservedPrefix { service: &'static str, prefix: String },

    #[error("URL prefix {prefix} is claimed by both {first} and {second}")]
    PrefixCollision {
        prefix: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("failed to start legacy API process {command:?}: {source}")]
    LegacyProcess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid static root directory {path:?}")]
    StaticRoot { path: std::path::PathBuf },

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    HttpBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Rpc(#[from] TransportError),

    #[error("failed to initialize engine sub-interfaces: {0}")]
    RpcInit(String),

    #[error("{listener} listener task panicked")]
    ListenerPanicked { listener: &'static str },

    #[error("listener(s) failed: {}", .failed.join("; "))]
    ListenersFailed { failed: Vec<String> },
}

/// Per-request template rendering failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("template {name} failed to render: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(name) => {
                warn!("Dashboard template not found: {name}");
                StatusCode::NOT_FOUND.into_response()
            }
            Self::Template { name, source } => {
                error!("Template {name} failed: {source:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    StatusCode::INTERNAL_SERVER_ERROR
                        .canonical_reason()
                        .unwrap_or("Internal Server Error"),
                )
                    .into_response()
            }
        }
    }
}

/// Upstream failures while forwarding a request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream {upstream} unreachable: {source}")]
    Upstream {
        upstream: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("upstream {upstream} switched protocols without an upgrade request")]
    UnexpectedUpgrade { upstream: String },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        warn!("Proxy error: {self}");
        (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
    }
}
