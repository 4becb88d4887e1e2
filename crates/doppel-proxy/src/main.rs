//! doppel - service virtualization proxy
//!
//! # Usage
//!
//! ```bash
//! # Simulate from a snapshot, as a plain webserver
//! doppel --webserver --simulation ./simulation.json
//!
//! # Record traffic passing through the proxy on port 8500
//! doppel --mode capture
//!
//! # Everything from a config file, with a flag override
//! doppel --config doppel.yaml --port 9000
//! ```

use clap::Parser;
use doppel_proxy::bootstrap::build_engine;
use doppel_proxy::config::Config;
use doppel_proxy::logging::init_tracing;
use doppel_proxy::proxy::{install_crypto_provider, serve_metrics, HyperUpstream, ProxyServer};
use doppel_proxy::{Engine, Mode, NoUpstream, Upstream};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "doppel")]
#[command(author, version, about = "Capture, simulate, modify and synthesize HTTP traffic")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "DOPPEL_CONFIG")]
    config: Option<String>,

    /// Listen port
    #[arg(short, long, env = "DOPPEL_PORT")]
    port: Option<u16>,

    /// Mode entered at startup: capture, simulate, modify or synthesize
    #[arg(short, long, env = "DOPPEL_MODE")]
    mode: Option<Mode>,

    /// Serve stored templates without any upstream
    #[arg(long, env = "DOPPEL_WEBSERVER")]
    webserver: bool,

    /// Regex over destinations to handle; others pass through
    #[arg(long, env = "DOPPEL_DESTINATION")]
    destination: Option<String>,

    /// Simulation snapshot to import at startup
    #[arg(long, env = "DOPPEL_SIMULATION")]
    simulation: Option<String>,

    /// Middleware binary
    #[arg(long, env = "DOPPEL_MIDDLEWARE_BINARY")]
    middleware_binary: Option<String>,

    /// Middleware script file, run by the middleware binary
    #[arg(long, env = "DOPPEL_MIDDLEWARE_SCRIPT")]
    middleware_script: Option<String>,

    /// Remote middleware URL
    #[arg(long, env = "DOPPEL_MIDDLEWARE_REMOTE")]
    middleware_remote: Option<String>,

    /// HTTP proxy for upstream traffic, http://[user:pass@]host:port
    #[arg(long, env = "DOPPEL_UPSTREAM_PROXY")]
    upstream_proxy: Option<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "DOPPEL_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "DOPPEL_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "DOPPEL_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.webserver {
            config.webserver = true;
        }
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if let Some(simulation) = &self.simulation {
            config.simulation = Some(simulation.clone());
        }
        if let Some(binary) = &self.middleware_binary {
            config.middleware.binary = binary.clone();
        }
        if let Some(script) = &self.middleware_script {
            config.middleware.script.clear();
            config.middleware.script_file = Some(script.clone());
        }
        if let Some(remote) = &self.middleware_remote {
            config.middleware.remote = remote.clone();
        }
        if let Some(proxy) = &self.upstream_proxy {
            config.upstream.proxy = Some(proxy.clone());
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;
    install_crypto_provider();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let passthrough = if config.webserver {
        None
    } else {
        Some(Arc::new(HyperUpstream::new(&config.upstream)?))
    };
    let upstream: Arc<dyn Upstream> = match &passthrough {
        Some(client) => client.clone(),
        None => Arc::new(NoUpstream),
    };

    let engine: Arc<Engine> = Arc::new(build_engine(&config, upstream).await?);
    info!("doppel {} starting in {} mode", engine.version(), engine.mode());

    if config.metrics.enabled {
        let addr = SocketAddr::new(config.listen.socket_addr()?.ip(), config.metrics.port);
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(addr, shutdown_signal()).await {
                error!("Metrics listener failed: {:#}", e);
            }
        });
    }

    let server = ProxyServer::bind(config.listen.socket_addr()?, engine, passthrough).await?;
    server.run(shutdown_signal()).await
}
