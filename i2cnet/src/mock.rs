//! In-memory bus for tests and for running a server without hardware.

use std::collections::{BTreeMap, BTreeSet};

use crate::bus::{SmBus, check_block_read, check_block_write};
use crate::error::{Error, Result};

/// Register file of one simulated device.
#[derive(Debug, Clone)]
struct MockDevice {
    /// 256 byte-wide registers, zero on creation.
    registers: [u8; 256],
    /// Register selected by the last send byte; advanced by receive byte.
    pointer: u8,
}

impl MockDevice {
    /// A device with every register cleared.
    const fn new() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
        }
    }
}

/// A simulated SMBus with devices at chosen addresses.
///
/// Devices behave like simple register-file chips (EEPROM, RTC): data
/// commands address a register directly, send byte sets the internal
/// pointer, and receive byte reads at the pointer and advances it. Block and
/// word accesses wrap at register `0xFF`.
///
/// Addresses without a device answer [`Error::NoDevice`]; addresses marked
/// with [`fail_address`](Self::fail_address) answer [`Error::Bus`].
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    /// Simulated devices by 7-bit address.
    devices: BTreeMap<u8, MockDevice>,
    /// Addresses that fail every transfer with a bus fault.
    faulty: BTreeSet<u8>,
    /// Number of `reset` calls.
    resets: usize,
    /// Whether quick writes fail like on adapters lacking `I2C_FUNC_SMBUS_QUICK`.
    no_quick: bool,
}

impl MockBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with a cleared device at each of `addresses`.
    pub fn with_devices(addresses: impl IntoIterator<Item = u8>) -> Self {
        let mut bus = Self::new();
        for address in addresses {
            bus.add_device(address);
        }
        bus
    }

    /// Attaches a cleared device at `address`.
    pub fn add_device(&mut self, address: u8) -> &mut Self {
        self.devices.insert(address, MockDevice::new());
        self
    }

    /// Makes every transfer to `address` fail with a bus fault.
    pub fn fail_address(&mut self, address: u8) -> &mut Self {
        self.faulty.insert(address);
        self
    }

    /// Makes every quick write fail with a bus fault, as adapters without
    /// quick-command support do.
    pub fn reject_quick_writes(&mut self) -> &mut Self {
        self.no_quick = true;
        self
    }

    /// Current value of a device register, or `None` if no device is attached.
    pub fn register(&self, address: u8, register: u8) -> Option<u8> {
        self.devices
            .get(&address)
            .map(|d| d.registers[usize::from(register)])
    }

    /// Number of times [`SmBus::reset`] was called.
    pub const fn resets(&self) -> usize {
        self.resets
    }

    /// Looks up the device at `address`, applying simulated faults.
    fn device(&mut self, address: u8) -> Result<&mut MockDevice> {
        if self.faulty.contains(&address) {
            return Err(Error::Bus {
                reason: format!("simulated fault at {address:#04x}"),
            });
        }
        self.devices
            .get_mut(&address)
            .ok_or(Error::NoDevice { address })
    }
}

impl SmBus for MockBus {
    fn write_quick(&mut self, address: u8) -> Result<()> {
        if self.no_quick {
            return Err(Error::Bus {
                reason: "quick write not supported by adapter".to_owned(),
            });
        }
        self.device(address).map(drop)
    }

    fn write_byte(&mut self, address: u8, value: u8) -> Result<()> {
        self.device(address)?.pointer = value;
        Ok(())
    }

    fn read_byte(&mut self, address: u8) -> Result<u8> {
        let dev = self.device(address)?;
        let value = dev.registers[usize::from(dev.pointer)];
        dev.pointer = dev.pointer.wrapping_add(1);
        Ok(value)
    }

    fn write_byte_data(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        self.device(address)?.registers[usize::from(register)] = value;
        Ok(())
    }

    fn read_byte_data(&mut self, address: u8, register: u8) -> Result<u8> {
        Ok(self.device(address)?.registers[usize::from(register)])
    }

    fn write_word_data(&mut self, address: u8, register: u8, value: u16) -> Result<()> {
        self.write_i2c_block_data(address, register, &value.to_le_bytes())
    }

    fn read_word_data(&mut self, address: u8, register: u8) -> Result<u16> {
        let regs = &self.device(address)?.registers;
        Ok(u16::from_le_bytes([
            regs[usize::from(register)],
            regs[usize::from(register.wrapping_add(1))],
        ]))
    }

    fn write_i2c_block_data(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()> {
        check_block_write(data)?;
        let dev = self.device(address)?;
        let mut reg = register;
        for &byte in data {
            dev.registers[usize::from(reg)] = byte;
            reg = reg.wrapping_add(1);
        }
        Ok(())
    }

    fn read_i2c_block_data(&mut self, address: u8, register: u8, length: u8) -> Result<Vec<u8>> {
        check_block_read(length)?;
        let dev = self.device(address)?;
        Ok((0..length)
            .map(|i| dev.registers[usize::from(register.wrapping_add(i))])
            .collect())
    }

    fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        Ok(())
    }
}
