//! i2cnet server: shares a local I2C bus with remote clients over TCP.

#![allow(clippy::print_stderr, clippy::missing_docs_in_private_items)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use i2cnet::MockBus;
use i2cnet_server::{Gateway, Server, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "i2cnet-server",
    version,
    about = "Serve a local I2C/SMBus bus to remote clients over TCP"
)]
struct Args {
    /// Interface to listen on [default: 0.0.0.0].
    #[arg(long)]
    host: Option<String>,

    /// TCP port to listen on [default: 8888].
    #[arg(short, long)]
    port: Option<u16>,

    /// I2C bus number to serve (/dev/i2c-N) [default: 1].
    #[arg(short, long)]
    bus: Option<u32>,

    /// JSON settings file; command-line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Most concurrent client connections [default: 16].
    #[arg(long)]
    max_connections: Option<usize>,

    /// Close connections idle for this many seconds; 0 never [default: 300].
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Serve a simulated bus with devices at these addresses (e.g. 0x50,0x68).
    #[arg(long, value_delimiter = ',', value_parser = parse_address)]
    mock: Option<Vec<u8>>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Merges the settings file (if any) with command-line overrides.
    fn settings(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bus) = self.bus {
            config.bus = bus;
        }
        if let Some(n) = self.max_connections {
            config.max_connections = n;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_ms = secs.saturating_mul(1000);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("i2cnet-server: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.settings()?;
    let gateway = Arc::new(open_gateway(&config, args.mock)?);
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    server.serve(gateway, shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

/// Opens the bus the server will own.
fn open_gateway(config: &ServerConfig, mock: Option<Vec<u8>>) -> Result<Gateway> {
    if let Some(addresses) = mock {
        info!(devices = ?addresses, "serving simulated bus");
        return Ok(Gateway::new(MockBus::with_devices(addresses)));
    }

    #[cfg(target_os = "linux")]
    {
        let bus = i2cnet::LinuxBus::open(config.bus)
            .with_context(|| format!("failed to open /dev/i2c-{}", config.bus))?;
        Ok(Gateway::new(bus))
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!(
            "bus {} unavailable: hardware buses require Linux (use --mock)",
            config.bus
        )
    }
}

/// Completes on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses a 7-bit address written in hex (`0x50`) or decimal (`80`).
fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}
