//! Single-host reverse proxy.
//!
//! Forwards every request under a mount point to a fixed upstream, rewriting
//! only the host and path. No load balancing, no retries. Upstream failures
//! become 502 responses for that request.
//!
//! Protocol upgrades (WebSocket) are relayed: when the upstream answers
//! `101 Switching Protocols`, both upgraded connections are spliced together
//! until either side closes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, Version,
        header::{CONNECTION, HOST, UPGRADE},
        uri::Authority,
    },
    response::Response,
};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tracing::{debug, warn};

use crate::adapter::ServiceAdapter;
use crate::error::{GatewayError, ProxyError};

type HttpClient = Client<HttpConnector, Body>;

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe one connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop_header(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Protocol the client asked to switch to, if `Connection` carries the
/// `upgrade` token and `Upgrade` names one.
fn requested_upgrade(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !wants_upgrade {
        return None;
    }
    headers.get(UPGRADE).cloned()
}

/// Splice the client and upstream connections once both have switched.
async fn tunnel(client: OnUpgrade, upstream: OnUpgrade, name: &'static str) {
    let (client, upstream) = match tokio::try_join!(client, upstream) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("{name}: upgrade failed: {e}");
            return;
        }
    };
    let mut client = TokioIo::new(client);
    let mut upstream = TokioIo::new(upstream);
    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((sent, received)) => {
            debug!("{name}: upgraded connection closed ({sent} bytes up, {received} bytes down)")
        }
        Err(e) => debug!("{name}: upgraded connection ended: {e}"),
    }
}

/// Reverse proxy to one plain-HTTP upstream.
#[derive(Clone)]
pub struct ReverseProxyAdapter {
    inner: Arc<Upstream>,
}

struct Upstream {
    name: &'static str,
    authority: Authority,
    /// Upstream base path without a trailing slash.
    base_path: String,
    /// Shared connection pool for every request to this upstream.
    client: HttpClient,
}

impl ReverseProxyAdapter {
    /// Parse `upstream` and prepare a pooled client for it.
    pub fn new(upstream: &str) -> Result<Self, GatewayError> {
        Self::named("reverse-proxy", upstream)
    }

    pub fn named(name: &'static str, upstream: &str) -> Result<Self, GatewayError> {
        let invalid = |reason: &str| GatewayError::InvalidUpstreamUrl {
            url: upstream.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = upstream.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty URL"));
        }
        let uri: Uri = trimmed.parse().map_err(|e: axum::http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme {other:?}"))),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        if authority.host().is_empty() {
            return Err(invalid("missing host"));
        }
        let base_path = uri.path().trim_end_matches('/').to_string();

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            inner: Arc::new(Upstream {
                name,
                authority,
                base_path,
                client,
            }),
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.inner.authority
    }

    /// Upstream URI for a request URI relative to the mount point.
    pub fn upstream_uri(&self, relative: &Uri) -> Result<Uri, ProxyError> {
        let path = relative.path();
        let sep = if path.starts_with('/') { "" } else { "/" };
        let query = relative
            .query()
            .map(|q| format!("?{q}"))
            .unwrap_or_default();
        let uri = Uri::builder()
            .scheme("http")
            .authority(self.inner.authority.clone())
            .path_and_query(format!("{}{sep}{path}{query}", self.inner.base_path))
            .build()?;
        Ok(uri)
    }

    /// Forward one request and relay the upstream response.
    pub async fn forward(&self, mut req: Request) -> Result<Response, ProxyError> {
        let target = self.upstream_uri(req.uri())?;
        debug!("{} {} -> {}", self.inner.name, req.uri(), target);

        let original_host = req.headers().get(HOST).cloned();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let upgrade = requested_upgrade(req.headers());
        let client_upgrade = upgrade
            .as_ref()
            .and_then(|_| req.extensions_mut().remove::<OnUpgrade>());

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(protocol) = upgrade {
            headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(UPGRADE, protocol);
        }
        if let Ok(host) = HeaderValue::from_str(self.inner.authority.as_str()) {
            headers.insert(HOST, host);
        }
        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }
        if let Some(ip) = peer {
            let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        *req.uri_mut() = target;
        *req.version_mut() = Version::HTTP_11;

        let mut response = self
            .inner
            .client
            .request(req)
            .await
            .map_err(|source| ProxyError::Upstream {
                upstream: self.inner.authority.to_string(),
                source,
            })?;

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            let upstream_upgrade = response.extensions_mut().remove::<OnUpgrade>();
            let (Some(client), Some(upstream)) = (client_upgrade, upstream_upgrade) else {
                return Err(ProxyError::UnexpectedUpgrade {
                    upstream: self.inner.authority.to_string(),
                });
            };
            tokio::spawn(tunnel(client, upstream, self.inner.name));
            // `Connection` and `Upgrade` belong to the handshake here.
            return Ok(response.map(Body::new));
        }

        let mut response = response.map(Body::new);
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

impl ServiceAdapter for ReverseProxyAdapter {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    fn into_router(self) -> Router {
        Router::new().fallback(proxy_handler).with_state(self)
    }
}

async fn proxy_handler(
    State(proxy): State<ReverseProxyAdapter>,
    req: Request,
) -> Result<Response, ProxyError> {
    proxy.forward(req).await
}
