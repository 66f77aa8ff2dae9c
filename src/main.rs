//! Playground: aggregating HTTP gateway with a sibling RPC listener
//!
//! Mounts the enabled sub-services (REST API proxy, entity search, Swagger
//! UI, JupyterLab proxy, web terminal) under URL prefixes on one HTTP port,
//! always serving the status dashboard at `/site/` and the static bundle at
//! `/`. Alongside it, a JSON-RPC listener exposes the enabled engine
//! sub-interfaces.
//!
//! Usage:
//!   playground --enable-all                         # Everything, default ports
//!   playground --enable-swagger-ui --http-port 9000 # One sub-service
//!   playground --enable-all --avoid-serving         # Compose and exit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use playground_gateway::config::default_xterm_hostnames;
use playground_gateway::{
    DualProtocolLauncher, EnableFlags, EngineSettings, GatewayConfig, RouteComposer, RoutingTable,
    RpcSettings, Upstreams, XtermSettings, engine_router,
};
use playground_rpc::InterfaceFlags;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "playground", about = "Playground: aggregating HTTP gateway and RPC server")]
struct Cli {
    /// Enable every sub-service and every engine sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_ALL")]
    enable_all: bool,

    /// Enable the REST API at /api/
    #[arg(long, env = "SENZING_TOOLS_ENABLE_REST_API")]
    enable_rest_api: bool,

    /// Enable the entity-search UI at /entity-search/
    #[arg(long, env = "SENZING_TOOLS_ENABLE_ENTITY_SEARCH")]
    enable_entity_search: bool,

    /// Enable the Swagger UI at /swagger/
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SWAGGER_UI")]
    enable_swagger_ui: bool,

    /// Enable the JupyterLab proxy at /jupyter/
    #[arg(long, env = "SENZING_TOOLS_ENABLE_JUPYTER_LAB")]
    enable_jupyter_lab: bool,

    /// Enable the web terminal at /xterm/
    #[arg(long, env = "SENZING_TOOLS_ENABLE_XTERM")]
    enable_xterm: bool,

    /// Expose the `config` RPC sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SZCONFIG")]
    enable_sz_config: bool,

    /// Expose the `configmanager` RPC sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SZCONFIGMANAGER")]
    enable_sz_config_manager: bool,

    /// Expose the `diagnostic` RPC sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SZDIAGNOSTIC")]
    enable_sz_diagnostic: bool,

    /// Expose the `engine` RPC sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SZENGINE")]
    enable_sz_engine: bool,

    /// Expose the `product` RPC sub-interface
    #[arg(long, env = "SENZING_TOOLS_ENABLE_SZPRODUCT")]
    enable_sz_product: bool,

    /// Address both listeners bind to
    #[arg(long, env = "SENZING_TOOLS_SERVER_ADDRESS", default_value = "0.0.0.0")]
    server_address: String,

    /// HTTP port (0 for OS-assigned)
    #[arg(long, env = "SENZING_TOOLS_HTTP_PORT", default_value = "8261")]
    http_port: u16,

    /// RPC port (0 for OS-assigned)
    #[arg(long, env = "SENZING_TOOLS_GRPC_PORT", default_value = "8260")]
    grpc_port: u16,

    /// Seconds allowed for reading request headers
    #[arg(long, env = "SENZING_TOOLS_READ_HEADER_TIMEOUT", default_value = "60")]
    read_header_timeout: u64,

    /// Never open a web browser
    #[arg(long, env = "SENZING_TOOLS_TTY_ONLY")]
    tty_only: bool,

    /// Build everything, then exit without serving
    #[arg(long, env = "SENZING_TOOLS_AVOID_SERVING")]
    avoid_serving: bool,

    /// Maximum concurrent RPC connections
    #[arg(long, env = "SENZING_TOOLS_GRPC_MAX_CONNECTIONS", default_value = "64")]
    grpc_max_connections: usize,

    /// Engine instance name
    #[arg(long, env = "SENZING_TOOLS_ENGINE_INSTANCE_NAME", default_value = "playground")]
    engine_instance_name: String,

    /// Engine settings JSON, passed through to sub-services
    #[arg(long, env = "SENZING_TOOLS_ENGINE_CONFIGURATION_JSON", default_value = "")]
    engine_settings: String,

    /// Engine log level, passed through to sub-services
    #[arg(long, env = "SENZING_TOOLS_ENGINE_LOG_LEVEL", default_value = "")]
    engine_log_level: String,

    /// Gateway log filter (overridden by RUST_LOG)
    #[arg(long, env = "SENZING_TOOLS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Upstream of the REST API and entity-search API proxies
    #[arg(long, env = "SENZING_TOOLS_LEGACY_API_URL", default_value = "http://localhost:8250")]
    legacy_api_url: String,

    /// Command that starts the legacy API (space separated)
    #[arg(long, env = "SENZING_TOOLS_LEGACY_API_COMMAND", value_delimiter = ' ', allow_hyphen_values = true)]
    legacy_api_command: Vec<String>,

    /// Upstream of the JupyterLab proxy
    #[arg(long, env = "SENZING_TOOLS_JUPYTER_URL", default_value = "http://localhost:8888")]
    jupyter_url: String,

    /// Serve `/` from this directory instead of the embedded bundle
    #[arg(long, env = "SENZING_TOOLS_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// OpenAPI document template replacing the embedded one
    #[arg(long, env = "SENZING_TOOLS_OPEN_API_SPECIFICATION_FILE")]
    open_api_specification_file: Option<PathBuf>,

    /// Title of the status dashboard
    #[arg(long, env = "SENZING_TOOLS_HTML_TITLE", default_value = "Playground")]
    html_title: String,

    /// Hostnames allowed to open a terminal (comma separated)
    #[arg(long, env = "SENZING_TOOLS_XTERM_ALLOWED_HOSTNAMES", value_delimiter = ',')]
    xterm_allowed_hostnames: Option<Vec<String>>,

    /// Arguments for the terminal command (space separated)
    #[arg(long, env = "SENZING_TOOLS_XTERM_ARGUMENTS", value_delimiter = ' ', allow_hyphen_values = true)]
    xterm_arguments: Vec<String>,

    /// Command each terminal session runs
    #[arg(long, env = "SENZING_TOOLS_XTERM_COMMAND", default_value = "/bin/bash")]
    xterm_command: String,

    /// Consecutive socket errors before a terminal session is closed
    #[arg(long, env = "SENZING_TOOLS_XTERM_CONNECTION_ERROR_LIMIT", default_value = "10")]
    xterm_connection_error_limit: u32,

    /// Seconds between terminal keepalive pings (0 disables)
    #[arg(long, env = "SENZING_TOOLS_XTERM_KEEPALIVE_PING_TIMEOUT", default_value = "20")]
    xterm_keepalive_ping_timeout: u64,

    /// Largest terminal output frame in bytes
    #[arg(long, env = "SENZING_TOOLS_XTERM_MAX_BUFFER_SIZE_BYTES", default_value = "512")]
    xterm_max_buffer_size_bytes: usize,

    /// Enable verbose logging
    #[arg(long, env = "SENZING_TOOLS_VERBOSE")]
    verbose: bool,

    /// Write logs to a file (defaults to ./playground.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<GatewayConfig> {
        let open_api_specification = match &self.open_api_specification_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading OpenAPI document {}", path.display()))?,
            ),
            None => None,
        };

        Ok(GatewayConfig {
            enable: EnableFlags {
                all: self.enable_all,
                rest_api: self.enable_rest_api,
                entity_search: self.enable_entity_search,
                swagger_ui: self.enable_swagger_ui,
                jupyter_lab: self.enable_jupyter_lab,
                xterm: self.enable_xterm,
            },
            upstreams: Upstreams {
                legacy_api: self.legacy_api_url,
                jupyter_lab: self.jupyter_url,
                legacy_api_command: self
                    .legacy_api_command
                    .into_iter()
                    .filter(|arg| !arg.is_empty())
                    .collect(),
            },
            server_address: self.server_address,
            http_port: self.http_port,
            read_header_timeout: Duration::from_secs(self.read_header_timeout),
            tty_only: self.tty_only,
            avoid_serving: self.avoid_serving,
            html_title: self.html_title,
            open_api_specification,
            static_root_dir: self.static_dir,
            engine: EngineSettings {
                instance_name: self.engine_instance_name,
                settings_json: self.engine_settings,
                verbose_logging: self.verbose,
                log_level: self.engine_log_level,
            },
            xterm: XtermSettings {
                allowed_hostnames: self
                    .xterm_allowed_hostnames
                    .unwrap_or_else(default_xterm_hostnames),
                command: self.xterm_command,
                arguments: self
                    .xterm_arguments
                    .into_iter()
                    .filter(|arg| !arg.is_empty())
                    .collect(),
                connection_error_limit: self.xterm_connection_error_limit,
                keepalive_ping_timeout: self.xterm_keepalive_ping_timeout,
                max_buffer_size_bytes: self.xterm_max_buffer_size_bytes,
            },
            rpc: RpcSettings {
                port: self.grpc_port,
                interfaces: InterfaceFlags {
                    all: self.enable_all,
                    config: self.enable_sz_config,
                    config_manager: self.enable_sz_config_manager,
                    diagnostic: self.enable_sz_diagnostic,
                    engine: self.enable_sz_engine,
                    product: self.enable_sz_product,
                },
                max_connections: Some(self.grpc_max_connections),
            },
            ..GatewayConfig::default()
        })
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level))
    };

    if let Some(ref log_file_arg) = cli.log_file {
        let log_path = if log_file_arg == "DEFAULT" {
            PathBuf::from("playground.log")
        } else {
            PathBuf::from(log_file_arg)
        };
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening log file {}", log_path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn print_banner(config: &GatewayConfig, table: &RoutingTable) {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".into());
    let base = format!("http://{host}:{}", config.http_port);

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                          Playground                          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  HTTP:       {}", config.http_address());
    println!("  RPC:        {}:{}", config.server_address, config.rpc.port);
    println!();
    println!("  Mounted:");
    for (name, prefix) in table.mounts() {
        println!("    {name:<20} {base}{prefix}");
    }
    println!();
    let exposed: Vec<&str> = config
        .rpc
        .interfaces
        .exposed()
        .into_iter()
        .map(|i| i.namespace())
        .collect();
    if exposed.is_empty() {
        println!("  RPC sub-interfaces: (none)");
    } else {
        println!("  RPC sub-interfaces: {}", exposed.join(", "));
    }
    if let Some(legacy) = table.legacy_process() {
        println!("  Legacy API: pid {:?} ({})", legacy.id(), legacy.command());
    }
    println!();
}

async fn run(config: GatewayConfig) -> Result<()> {
    let table = RouteComposer::new(&config)
        .compose()
        .context("composing routes")?;
    print_banner(&config, &table);

    let router = engine_router(&config);
    router
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("initializing engine sub-interfaces: {e}"))?;
    let router = Arc::new(router);

    let launcher = DualProtocolLauncher::new(&config, table, router.clone());
    if !config.avoid_serving {
        println!("  Press Ctrl+C to stop.");
        println!();
    }
    let report = launcher
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    router.shutdown().await;
    info!("Gateway stopped");
    report.into_result().context("serving")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    let result = match cli.into_config() {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_onto_gateway_defaults() {
        let cli = Cli::parse_from(["playground", "--xterm-allowed-hostnames", "localhost"]);
        let config = cli.into_config().unwrap();
        let defaults = GatewayConfig::default();
        assert_eq!(config.http_port, defaults.http_port);
        assert_eq!(config.rpc.port, defaults.rpc.port);
        assert_eq!(config.server_address, defaults.server_address);
        assert_eq!(config.read_header_timeout, defaults.read_header_timeout);
        assert_eq!(config.upstreams, defaults.upstreams);
        assert_eq!(config.xterm, defaults.xterm);
        assert_eq!(config.enable, EnableFlags::default());
    }

    #[test]
    fn enable_all_reaches_rpc_interfaces() {
        let cli = Cli::parse_from(["playground", "--enable-all", "--enable-sz-product"]);
        let config = cli.into_config().unwrap();
        assert!(config.enable.all);
        assert!(config.rpc.interfaces.all);
        assert!(config.rpc.interfaces.product);
        assert!(!config.rpc.interfaces.engine);
    }

    #[test]
    fn list_options_split() {
        let cli = Cli::parse_from([
            "playground",
            "--xterm-allowed-hostnames",
            "localhost,10.0.0.5",
            "--xterm-arguments",
            "-l -i",
            "--legacy-api-command",
            "java -jar api.jar",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.xterm.allowed_hostnames, vec!["localhost", "10.0.0.5"]);
        assert_eq!(config.xterm.arguments, vec!["-l", "-i"]);
        assert_eq!(config.upstreams.legacy_api_command, vec!["java", "-jar", "api.jar"]);
    }
}
