//! Local SMBus access through the Linux `i2c-dev` interface.

#![cfg(target_os = "linux")]

use std::io;
use std::path::{Path, PathBuf};

use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use i2cnet_proto::FIRST_ADDRESS;
use tracing::{debug, info};

use crate::bus::{SmBus, check_block_read, check_block_write};
use crate::error::{Error, Result};

/// A physical bus opened from `/dev/i2c-N`.
///
/// One file descriptor is reused for every target; the slave address is
/// selected before each transaction.
pub struct LinuxBus {
    /// Device node the bus was opened from.
    path: PathBuf,
    /// Open `i2c-dev` handle.
    device: LinuxI2CDevice,
}

impl std::fmt::Debug for LinuxBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxBus")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LinuxBus {
    /// Opens bus number `bus` (`/dev/i2c-<bus>`).
    pub fn open(bus: u32) -> io::Result<Self> {
        Self::open_path(format!("/dev/i2c-{bus}"))
    }

    /// Opens the bus at an explicit device node.
    pub fn open_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let device = LinuxI2CDevice::new(&path, u16::from(FIRST_ADDRESS))?;
        info!(path = %path.display(), "i2c bus opened");
        Ok(Self { path, device })
    }

    /// Device node this bus was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selects `address` and runs `f` against the device.
    fn with<T>(
        &mut self,
        address: u8,
        f: impl FnOnce(&mut LinuxI2CDevice) -> std::result::Result<T, LinuxI2CError>,
    ) -> Result<T> {
        self.device
            .set_slave_address(u16::from(address))
            .and_then(|()| f(&mut self.device))
            .map_err(|e| classify(address, e))
    }
}

/// Maps an `i2c-dev` failure onto the bus error taxonomy.
///
/// Adapters report a missing address-phase ACK as `ENXIO` and a data-phase
/// NACK as `EREMOTEIO`; both mean the device did not answer.
fn classify(address: u8, e: LinuxI2CError) -> Error {
    let e = io::Error::from(e);
    match e.raw_os_error() {
        Some(libc::ENXIO | libc::EREMOTEIO) => Error::NoDevice { address },
        _ => {
            debug!(address, error = %e, "transfer fault");
            Error::Bus {
                reason: format!("{address:#04x}: {e}"),
            }
        }
    }
}

impl SmBus for LinuxBus {
    fn write_quick(&mut self, address: u8) -> Result<()> {
        self.with(address, |d| d.smbus_write_quick(false))
    }

    fn write_byte(&mut self, address: u8, value: u8) -> Result<()> {
        self.with(address, |d| d.smbus_write_byte(value))
    }

    fn read_byte(&mut self, address: u8) -> Result<u8> {
        self.with(address, |d| d.smbus_read_byte())
    }

    fn write_byte_data(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        self.with(address, |d| d.smbus_write_byte_data(register, value))
    }

    fn read_byte_data(&mut self, address: u8, register: u8) -> Result<u8> {
        self.with(address, |d| d.smbus_read_byte_data(register))
    }

    fn write_word_data(&mut self, address: u8, register: u8, value: u16) -> Result<()> {
        self.with(address, |d| d.smbus_write_word_data(register, value))
    }

    fn read_word_data(&mut self, address: u8, register: u8) -> Result<u16> {
        self.with(address, |d| d.smbus_read_word_data(register))
    }

    fn write_i2c_block_data(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()> {
        check_block_write(data)?;
        self.with(address, |d| d.smbus_write_i2c_block_data(register, data))
    }

    fn read_i2c_block_data(&mut self, address: u8, register: u8, length: u8) -> Result<Vec<u8>> {
        check_block_read(length)?;
        self.with(address, |d| d.smbus_read_i2c_block_data(register, length))
    }

    /// Closes and reopens the device node.
    fn reset(&mut self) -> Result<()> {
        self.device = LinuxI2CDevice::new(&self.path, u16::from(FIRST_ADDRESS)).map_err(|e| {
            Error::Bus {
                reason: format!("reopen {}: {}", self.path.display(), io::Error::from(e)),
            }
        })?;
        info!(path = %self.path.display(), "i2c bus reopened");
        Ok(())
    }
}
