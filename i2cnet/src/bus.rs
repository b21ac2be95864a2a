//! The SMBus call surface shared by local, mock, and remote buses.

use i2cnet_proto::MAX_BLOCK;

use crate::error::{Error, Result};
use crate::scan::{self, Probe};

/// Operations of a local SMBus handle.
///
/// [`RemoteBus`](crate::RemoteBus), [`MockBus`](crate::MockBus) and, on Linux,
/// [`LinuxBus`](crate::LinuxBus) all implement this trait, so consumer code
/// written against it runs unchanged whether the bus is local or remote.
///
/// Words are little-endian (SMBus byte order). Block operations are limited
/// to [`MAX_BLOCK`] bytes.
pub trait SmBus {
    /// Addresses the device without transferring data (SMBus quick write).
    fn write_quick(&mut self, address: u8) -> Result<()>;

    /// Sends a single byte without a register (SMBus send byte).
    fn write_byte(&mut self, address: u8, value: u8) -> Result<()>;

    /// Receives a single byte without a register (SMBus receive byte).
    fn read_byte(&mut self, address: u8) -> Result<u8>;

    /// Writes one byte to `register`.
    fn write_byte_data(&mut self, address: u8, register: u8, value: u8) -> Result<()>;

    /// Reads one byte from `register`.
    fn read_byte_data(&mut self, address: u8, register: u8) -> Result<u8>;

    /// Writes a 16-bit word to `register`.
    fn write_word_data(&mut self, address: u8, register: u8, value: u16) -> Result<()>;

    /// Reads a 16-bit word from `register`.
    fn read_word_data(&mut self, address: u8, register: u8) -> Result<u16>;

    /// Writes up to 32 bytes starting at `register`.
    fn write_i2c_block_data(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()>;

    /// Reads `length` bytes (1..=32) starting at `register`.
    fn read_i2c_block_data(&mut self, address: u8, register: u8, length: u8) -> Result<Vec<u8>>;

    /// Lists responding addresses in ascending order.
    ///
    /// The default probes each address with a quick write, which touches no
    /// register on the device, and falls back to a receive byte where the
    /// adapter rejects quick writes.
    fn scan(&mut self) -> Result<Vec<u8>> {
        scan::scan(self, Probe::Quick)
    }

    /// Reinitializes the underlying bus handle. A no-op unless overridden.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Rejects block writes larger than [`MAX_BLOCK`].
pub(crate) fn check_block_write(data: &[u8]) -> Result<()> {
    if data.len() > MAX_BLOCK {
        return Err(Error::BlockTooLarge { len: data.len() });
    }
    Ok(())
}

/// Rejects block reads outside `1..=MAX_BLOCK`.
pub(crate) fn check_block_read(length: u8) -> Result<()> {
    if length == 0 || usize::from(length) > MAX_BLOCK {
        return Err(Error::InvalidLength {
            len: usize::from(length),
        });
    }
    Ok(())
}
