//! Server settings and their JSON file form.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use i2cnet_proto::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Listen address, bus selection, and limits for [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ServerConfig {
    /// Interface to listen on.
    pub host: String,
    /// TCP port to listen on (`0` picks a free port).
    pub port: u16,
    /// Linux I2C bus number (`/dev/i2c-<bus>`).
    pub bus: u32,
    /// Most concurrent client connections; extra connections are dropped.
    pub max_connections: usize,
    /// Close a connection that sends no request for this long, in
    /// milliseconds; `0` never closes. Frees slots held by dead peers.
    pub idle_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            bus: 1,
            max_connections: 16,
            idle_timeout_ms: 300_000,
        }
    }
}

impl ServerConfig {
    /// Default settings listening on `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the connection cap.
    #[must_use]
    pub const fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Sets the idle timeout (`Duration::ZERO` disables it).
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Idle timeout, or `None` if connections may stay idle forever.
    pub fn idle_timeout_duration(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
