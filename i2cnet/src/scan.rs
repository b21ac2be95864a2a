//! Bus scanning by probing every address in `0x03..=0x77`.
//!
//! Probing is not always side-effect free. A quick write touches no register
//! but a few write-only chips latch on it; a receive-byte read is harmless for
//! most devices but can advance an internal pointer. [`Probe::Quick`] is the
//! default, [`Probe::Auto`] follows i2cdetect's per-range choice.

use i2cnet_proto::{FIRST_ADDRESS, LAST_ADDRESS};
use tracing::debug;

use crate::bus::SmBus;
use crate::error::{Error, Result};

/// How each candidate address is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Probe {
    /// SMBus quick write: address phase only, no register access.
    #[default]
    Quick,
    /// SMBus receive byte.
    ReadByte,
    /// Receive byte for EEPROM and write-protect ranges, quick write elsewhere.
    Auto,
}

impl Probe {
    /// Resolves [`Probe::Auto`] to the concrete probe used for `address`.
    pub const fn for_address(self, address: u8) -> Self {
        match self {
            // Quick writes can corrupt AT24RF08 EEPROMs and some write-protect chips.
            Self::Auto if matches!(address, 0x30..=0x37 | 0x50..=0x5F) => Self::ReadByte,
            Self::Auto => Self::Quick,
            other => other,
        }
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Quick => "quick",
            Self::ReadByte => "read-byte",
            Self::Auto => "auto",
        })
    }
}

impl std::str::FromStr for Probe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "read-byte" | "read" => Ok(Self::ReadByte),
            "auto" => Ok(Self::Auto),
            _ => Err(format!("unknown probe: {s}")),
        }
    }
}

/// Probes `0x03..=0x77` in ascending order and returns the responding addresses.
///
/// An acknowledged probe includes the address. A missing acknowledgment or a
/// bus fault excludes it. Transport and protocol errors abort the scan, since
/// they say nothing about the device.
///
/// Some adapters (i2c-omap among them) cannot issue a quick write and fail
/// it as a bus fault; such addresses are retried with a receive byte.
pub fn scan<B: SmBus + ?Sized>(bus: &mut B, probe: Probe) -> Result<Vec<u8>> {
    let mut found = Vec::new();
    for address in FIRST_ADDRESS..=LAST_ADDRESS {
        let outcome = match probe.for_address(address) {
            Probe::ReadByte => bus.read_byte(address).map(drop),
            _ => match bus.write_quick(address) {
                Err(Error::Bus { reason }) => {
                    debug!(address, %reason, "quick write failed, retrying with receive byte");
                    bus.read_byte(address).map(drop)
                }
                other => other,
            },
        };
        match outcome {
            Ok(()) => found.push(address),
            Err(Error::NoDevice { .. }) => {}
            Err(Error::Bus { reason }) => debug!(address, %reason, "probe failed"),
            Err(e) => return Err(e),
        }
    }
    debug!(?found, %probe, "scan complete");
    Ok(found)
}
