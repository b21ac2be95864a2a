//! CLI for reaching an i2cnet server.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use i2cnet::scan::{self, Probe};
use i2cnet::{ClientConfig, RemoteBus, SmBus};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "i2cnet", version, about = "Use a remote I2C/SMBus bus over TCP")]
struct Cli {
    /// Server host name or address [default: 192.168.1.200].
    #[arg(long)]
    host: Option<String>,

    /// Server TCP port [default: 8888].
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON settings file [default: <config dir>/i2cnet/client.json].
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List the devices that acknowledge their address.
    #[arg(long)]
    scan: bool,

    /// Probe each address from this side with the given method
    /// (quick, read-byte, auto) instead of one server-side scan.
    #[arg(long, requires = "scan")]
    probe: Option<Probe>,

    /// Scan a bus attached to this machine rather than the server's.
    #[arg(long, requires = "scan")]
    local: bool,

    /// Local I2C bus number (/dev/i2c-N) [default: 1].
    #[arg(short, long, requires = "local")]
    bus: Option<u32>,

    /// Check that the server is reachable and its bus answers.
    #[arg(long, conflicts_with = "scan")]
    test: bool,

    /// Output format for scan results.
    #[arg(long, default_value = "table")]
    format: OutputFormat,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// i2cdetect-style address grid.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.dispatch() {
        eprintln!("i2cnet: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        let config = self.settings()?;
        if self.test {
            return test(&config);
        }
        if self.scan {
            let found = if self.local {
                local_scan(self.bus.unwrap_or(1), self.probe.unwrap_or_default())?
            } else {
                remote_scan(&config, self.probe)?
            };
            return print_devices(&found, self.format);
        }
        println!("server: {}:{}", config.host, config.port);
        Ok(())
    }

    /// Merges the settings file (if any) with command-line overrides.
    fn settings(&self) -> Result<ClientConfig> {
        let path = self.config.clone().or_else(|| {
            default_config_path().filter(|p| p.is_file())
        });
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading settings");
                ClientConfig::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?
            }
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("i2cnet").join("client.json"))
}

fn connect(config: &ClientConfig) -> Result<RemoteBus> {
    RemoteBus::open(config.clone())
        .with_context(|| format!("cannot reach {}:{}", config.host, config.port))
}

fn test(config: &ClientConfig) -> Result<()> {
    let started = Instant::now();
    let mut bus = connect(config)?;
    let found = bus.scan().context("remote scan failed")?;
    bus.close();
    println!(
        "connected to {}:{}: {} device(s) responded in {} ms",
        config.host,
        config.port,
        found.len(),
        started.elapsed().as_millis()
    );
    Ok(())
}

fn remote_scan(config: &ClientConfig, probe: Option<Probe>) -> Result<Vec<u8>> {
    let mut bus = connect(config)?;
    let found = match probe {
        Some(probe) => {
            info!(%probe, "probing remote bus address by address");
            scan::scan(&mut bus, probe)
        }
        None => bus.scan(),
    }
    .context("scan failed")?;
    bus.close();
    Ok(found)
}

#[cfg(target_os = "linux")]
fn local_scan(bus: u32, probe: Probe) -> Result<Vec<u8>> {
    let mut local =
        i2cnet::LinuxBus::open(bus).with_context(|| format!("failed to open /dev/i2c-{bus}"))?;
    Ok(scan::scan(&mut local, probe)?)
}

#[cfg(not(target_os = "linux"))]
fn local_scan(_bus: u32, _probe: Probe) -> Result<Vec<u8>> {
    anyhow::bail!("local buses require Linux")
}

fn print_devices(found: &[u8], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let obj = serde_json::json!({ "devices": found });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
        OutputFormat::Table => print!("{}", grid(found)),
    }
    Ok(())
}

/// Renders addresses as the 8x16 grid `i2cdetect` prints.
fn grid(found: &[u8]) -> String {
    let mut out = String::from("   ");
    for col in 0..16 {
        let _ = write!(out, "  {col:x}");
    }
    out.push('\n');
    for row in (0..0x80u8).step_by(16) {
        let _ = write!(out, "{row:02x}:");
        for address in row..row + 16 {
            if !(0x03..=0x77).contains(&address) {
                out.push_str("   ");
            } else if found.contains(&address) {
                let _ = write!(out, " {address:02x}");
            } else {
                out.push_str(" --");
            }
        }
        out.push('\n');
    }
    out
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn grid_marks_found_devices() {
        let out = grid(&[0x50, 0x68]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with("     0  1  2"));
        assert_eq!(
            lines[1],
            "00:          -- -- -- -- -- -- -- -- -- -- -- -- --"
        );
        assert!(lines[6].starts_with("50: 50 -- --"));
        assert!(lines[7].starts_with("60: -- -- -- -- -- -- -- -- 68 --"));
        assert_eq!(lines[8].len(), 3 + 16 * 3);
        assert!(lines[8].trim_end().ends_with("-- --"));
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, r#"{ "host": "10.0.0.2", "port": 9000 }"#).unwrap();

        let cli = Cli::parse_from(["i2cnet", "--config", path.to_str().unwrap(), "-p", "7000"]);
        let config = cli.settings().unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn bus_requires_local() {
        assert!(Cli::try_parse_from(["i2cnet", "--scan", "--bus", "2"]).is_err());
        let cli = Cli::try_parse_from(["i2cnet", "--scan", "--local", "--bus", "2"]).unwrap();
        assert_eq!(cli.bus, Some(2));
    }

    #[test]
    fn probe_requires_scan() {
        assert!(Cli::try_parse_from(["i2cnet", "--probe", "auto"]).is_err());
        let cli = Cli::try_parse_from(["i2cnet", "--scan", "--probe", "read-byte"]).unwrap();
        assert_eq!(cli.probe, Some(Probe::ReadByte));
    }
}
