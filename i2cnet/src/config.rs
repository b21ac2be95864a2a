//! Client connection settings and their JSON file form.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use i2cnet_proto::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Where and how a [`Session`](crate::Session) connects.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides:
///
/// ```json
/// { "host": "beaglebone.local", "io_timeout_ms": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Upper bound on establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upper bound on each request write and response read, in milliseconds.
    pub io_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.200".to_owned(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    /// Default settings targeting `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    /// Sets the per-request I/O timeout.
    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = millis(timeout);
        self
    }

    /// Connect timeout as a [`Duration`] (never zero).
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// I/O timeout as a [`Duration`] (never zero).
    pub fn io_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms.max(1))
    }

    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Writes settings to a JSON file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
}

/// Whole milliseconds in `d`, saturating.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
