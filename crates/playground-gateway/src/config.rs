//! Gateway configuration.
//!
//! Built once at startup (from the CLI or deserialized) and never mutated
//! afterwards. Everything downstream borrows from it or copies out the
//! fields it needs.

use std::path::PathBuf;
use std::time::Duration;

use playground_rpc::InterfaceFlags;
use serde::{Deserialize, Serialize};

use crate::adapter::SubService;
use crate::error::GatewayError;

/// Prefix reserved for the status dashboard.
pub const DASHBOARD_PREFIX: &str = "site";

/// Which sub-services are mounted. `all` overrides every individual flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnableFlags {
    pub all: bool,
    pub rest_api: bool,
    pub entity_search: bool,
    pub swagger_ui: bool,
    pub jupyter_lab: bool,
    pub xterm: bool,
}

impl EnableFlags {
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }
}

/// URL prefix per sub-service, without surrounding slashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePrefixes {
    pub api: String,
    pub entity_search: String,
    pub swagger: String,
    pub jupyter: String,
    pub xterm: String,
}

impl Default for RoutePrefixes {
    fn default() -> Self {
        Self {
            api: "api".into(),
            entity_search: "entity-search".into(),
            swagger: "swagger".into(),
            jupyter: "jupyter".into(),
            xterm: "xterm".into(),
        }
    }
}

/// Upstream targets for the reverse-proxied sub-services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstreams {
    pub legacy_api: String,
    pub jupyter_lab: String,
    /// Command line that starts the legacy API process. Empty means the
    /// process is managed elsewhere.
    pub legacy_api_command: Vec<String>,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            legacy_api: "http://localhost:8250".into(),
            jupyter_lab: "http://localhost:8888".into(),
            legacy_api_command: Vec::new(),
        }
    }
}

/// Engine settings handed through to sub-services unexamined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub instance_name: String,
    pub settings_json: String,
    pub verbose_logging: bool,
    pub log_level: String,
}

/// Terminal sub-service limits and command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XtermSettings {
    /// Hostnames allowed to open a terminal. Empty allows any host.
    pub allowed_hostnames: Vec<String>,
    pub command: String,
    pub arguments: Vec<String>,
    pub connection_error_limit: u32,
    /// Seconds between keepalive pings.
    pub keepalive_ping_timeout: u64,
    pub max_buffer_size_bytes: usize,
}

impl Default for XtermSettings {
    fn default() -> Self {
        Self {
            allowed_hostnames: vec!["localhost".into()],
            command: "/bin/bash".into(),
            arguments: Vec::new(),
            connection_error_limit: 10,
            keepalive_ping_timeout: 20,
            max_buffer_size_bytes: 512,
        }
    }
}

/// RPC listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub port: u16,
    pub interfaces: InterfaceFlags,
    pub max_connections: Option<usize>,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            port: 8260,
            interfaces: InterfaceFlags::default(),
            max_connections: Some(64),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub enable: EnableFlags,
    pub prefixes: RoutePrefixes,
    pub upstreams: Upstreams,
    pub server_address: String,
    pub http_port: u16,
    pub read_header_timeout: Duration,
    /// Never open a browser.
    pub tty_only: bool,
    /// Construct everything, bind nothing.
    pub avoid_serving: bool,
    pub html_title: String,
    /// OpenAPI document template replacing the embedded one.
    pub open_api_specification: Option<String>,
    /// Serve `/` from this directory instead of the embedded bundle.
    pub static_root_dir: Option<PathBuf>,
    pub engine: EngineSettings,
    pub xterm: XtermSettings,
    pub rpc: RpcSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enable: EnableFlags::default(),
            prefixes: RoutePrefixes::default(),
            upstreams: Upstreams::default(),
            server_address: "0.0.0.0".into(),
            http_port: 8261,
            read_header_timeout: Duration::from_secs(60),
            tty_only: false,
            avoid_serving: false,
            html_title: "Playground".into(),
            open_api_specification: None,
            static_root_dir: None,
            engine: EngineSettings::default(),
            xterm: XtermSettings::default(),
            rpc: RpcSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// `address:port` of the HTTP listener.
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server_address, self.http_port)
    }

    /// URL the browser is pointed at.
    pub fn browser_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }

    /// Mount keys (`/prefix/`) of every enabled sub-service, in priority
    /// order, after checking that none is empty, reserved or duplicated.
    pub fn validate(&self) -> Result<Vec<(SubService, String)>, GatewayError> {
        let mut claimed: Vec<(SubService, String)> = Vec::new();

        for service in SubService::PRIORITY {
            if !service.is_enabled(&self.enable) {
                continue;
            }
            let prefix = service.prefix(&self.prefixes);
            if prefix.is_empty() {
                return Err(GatewayError::EmptyPrefix {
                    service: service.name(),
                });
            }
            if prefix == DASHBOARD_PREFIX {
                return Err(GatewayError::ReservedPrefix {
                    service: service.name(),
                    prefix,
                });
            }
            let key = mount_key(&prefix);
            if let Some((owner, _)) = claimed.iter().find(|(_, k)| *k == key) {
                return Err(GatewayError::PrefixCollision {
                    prefix: key,
                    first: owner.name(),
                    second: service.name(),
                });
            }
            claimed.push((service, key));
        }

        Ok(claimed)
    }
}

/// IP address of the interface used for outbound traffic, if any. Nothing
/// is sent; connecting a UDP socket only selects a route.
pub fn outbound_ip() -> Option<std::net::IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// `localhost` plus the outbound IP when it can be discovered.
pub fn default_xterm_hostnames() -> Vec<String> {
    let mut hostnames = vec!["localhost".to_string()];
    if let Some(ip) = outbound_ip() {
        hostnames.push(ip.to_string());
    }
    hostnames
}

/// Trim surrounding slashes and collapse repeated inner ones.
pub fn normalize_prefix(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `/prefix/` form used as the routing key.
pub fn mount_key(normalized: &str) -> String {
    if normalized.is_empty() {
        "/".into()
    } else {
        format!("/{normalized}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes() {
        assert_eq!(normalize_prefix("/swagger/"), "swagger");
        assert_eq!(normalize_prefix("a//b/"), "a/b");
        assert_eq!(normalize_prefix("///"), "");
        assert_eq!(mount_key("swagger"), "/swagger/");
        assert_eq!(mount_key(""), "/");
    }

    #[test]
    fn defaults_match_cli_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.http_address(), "0.0.0.0:8261");
        assert_eq!(config.rpc.port, 8260);
        assert_eq!(config.read_header_timeout, Duration::from_secs(60));
        assert_eq!(config.upstreams.legacy_api, "http://localhost:8250");
        assert_eq!(config.upstreams.jupyter_lab, "http://localhost:8888");
    }

    #[test]
    fn disabled_services_skip_validation() {
        let mut config = GatewayConfig::default();
        config.prefixes.swagger = String::new();
        assert!(config.validate().unwrap().is_empty());

        config.enable.swagger_ui = true;
        assert!(matches!(
            config.validate(),
            Err(GatewayError::EmptyPrefix { service: "swagger-ui" })
        ));
    }

    #[test]
    fn slash_variants_collide() {
        let mut config = GatewayConfig::default();
        config.enable = EnableFlags::everything();
        config.prefixes.xterm = "/swagger/".into();
        match config.validate() {
            Err(GatewayError::PrefixCollision { prefix, first, second }) => {
                assert_eq!(prefix, "/swagger/");
                assert_eq!(first, "swagger-ui");
                assert_eq!(second, "xterm");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn dashboard_prefix_is_reserved() {
        let mut config = GatewayConfig::default();
        config.enable.jupyter_lab = true;
        config.prefixes.jupyter = "site".into();
        assert!(matches!(config.validate(), Err(GatewayError::ReservedPrefix { .. })));
    }

    #[test]
    fn deserializes_partial_document() {
        let config: GatewayConfig = serde_json::from_value(serde_json::json!({
            "enable": { "swagger_ui": true },
            "http_port": 9000
        }))
        .unwrap();
        assert!(config.enable.swagger_ui);
        assert!(!config.enable.all);
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.prefixes.swagger, "swagger");
    }

    #[test]
    fn xterm_hostnames_start_with_localhost() {
        let hostnames = default_xterm_hostnames();
        assert_eq!(hostnames[0], "localhost");
        assert!(hostnames.len() <= 2);
    }
}
