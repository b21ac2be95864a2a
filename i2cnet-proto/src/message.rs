//! Bus operation and response types shared by client and server.

/// Default TCP port of the i2cnet server.
pub const DEFAULT_PORT: u16 = 8888;

/// Wire protocol revision spoken by this crate. Both ends assume it.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest SMBus block transfer, in bytes.
pub const MAX_BLOCK: usize = 32;

/// Lowest 7-bit address that may be probed or addressed.
pub const FIRST_ADDRESS: u8 = 0x03;

/// Highest 7-bit address that may be probed or addressed.
pub const LAST_ADDRESS: u8 = 0x77;

/// Size of the SCAN response bitmap (one bit per 7-bit address).
pub const SCAN_BITMAP_LEN: usize = 16;

/// Returns `true` if `address` lies in the addressable range `0x03..=0x77`.
pub const fn is_valid_address(address: u8) -> bool {
    address >= FIRST_ADDRESS && address <= LAST_ADDRESS
}

/// Operation code carried in the first byte of a request frame.
#[allow(clippy::exhaustive_enums)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// SMBus send byte.
    WriteByte = 0x01,
    /// SMBus receive byte.
    ReadByte = 0x02,
    /// SMBus write byte data.
    WriteByteData = 0x03,
    /// SMBus read byte data.
    ReadByteData = 0x04,
    /// SMBus write word data.
    WriteWordData = 0x05,
    /// SMBus read word data.
    ReadWordData = 0x06,
    /// I2C block write to a register.
    WriteBlock = 0x07,
    /// I2C block read from a register.
    ReadBlock = 0x08,
    /// Server-side scan of the whole address range.
    Scan = 0x09,
    /// SMBus quick write (address only, no data).
    WriteQuick = 0x0A,
    /// Close and reopen the physical bus on the server.
    Reset = 0x0B,
}

impl Opcode {
    /// Whether request frames with this opcode carry `length` payload bytes.
    ///
    /// Read-class opcodes never carry a payload; for [`Opcode::ReadBlock`]
    /// the length byte is the requested read length instead.
    pub const fn carries_payload(self) -> bool {
        matches!(
            self,
            Self::WriteByte | Self::WriteByteData | Self::WriteWordData | Self::WriteBlock
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = crate::ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x01 => Self::WriteByte,
            0x02 => Self::ReadByte,
            0x03 => Self::WriteByteData,
            0x04 => Self::ReadByteData,
            0x05 => Self::WriteWordData,
            0x06 => Self::ReadWordData,
            0x07 => Self::WriteBlock,
            0x08 => Self::ReadBlock,
            0x09 => Self::Scan,
            0x0A => Self::WriteQuick,
            0x0B => Self::Reset,
            other => return Err(crate::ProtocolError::UnknownOpcode(other)),
        })
    }
}

/// A single bus transaction requested by a client.
///
/// Each variant holds exactly the fields its opcode uses; the codec writes
/// zero for every other header byte.
#[allow(clippy::exhaustive_enums)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOperation {
    /// Address-only probe.
    WriteQuick {
        /// 7-bit device address.
        address: u8,
    },
    /// Send one byte without a register.
    WriteByte {
        /// 7-bit device address.
        address: u8,
        /// Byte to send.
        value: u8,
    },
    /// Receive one byte without a register.
    ReadByte {
        /// 7-bit device address.
        address: u8,
    },
    /// Write one byte to a register.
    WriteByteData {
        /// 7-bit device address.
        address: u8,
        /// Target register.
        register: u8,
        /// Byte to write.
        value: u8,
    },
    /// Read one byte from a register.
    ReadByteData {
        /// 7-bit device address.
        address: u8,
        /// Source register.
        register: u8,
    },
    /// Write a 16-bit word to a register.
    WriteWordData {
        /// 7-bit device address.
        address: u8,
        /// Target register.
        register: u8,
        /// Word to write (sent low byte first).
        value: u16,
    },
    /// Read a 16-bit word from a register.
    ReadWordData {
        /// 7-bit device address.
        address: u8,
        /// Source register.
        register: u8,
    },
    /// Write up to [`MAX_BLOCK`] bytes starting at a register.
    WriteBlock {
        /// 7-bit device address.
        address: u8,
        /// First register.
        register: u8,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// Read `length` bytes (1..=[`MAX_BLOCK`]) starting at a register.
    ReadBlock {
        /// 7-bit device address.
        address: u8,
        /// First register.
        register: u8,
        /// Number of bytes requested.
        length: u8,
    },
    /// Probe every address on the server's bus.
    Scan,
    /// Reopen the server's bus handle.
    Reset,
}

impl BusOperation {
    /// The opcode this operation is framed with.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::WriteQuick { .. } => Opcode::WriteQuick,
            Self::WriteByte { .. } => Opcode::WriteByte,
            Self::ReadByte { .. } => Opcode::ReadByte,
            Self::WriteByteData { .. } => Opcode::WriteByteData,
            Self::ReadByteData { .. } => Opcode::ReadByteData,
            Self::WriteWordData { .. } => Opcode::WriteWordData,
            Self::ReadWordData { .. } => Opcode::ReadWordData,
            Self::WriteBlock { .. } => Opcode::WriteBlock,
            Self::ReadBlock { .. } => Opcode::ReadBlock,
            Self::Scan => Opcode::Scan,
            Self::Reset => Opcode::Reset,
        }
    }

    /// Target device address, or `None` for bus-wide operations.
    pub const fn address(&self) -> Option<u8> {
        match *self {
            Self::WriteQuick { address }
            | Self::WriteByte { address, .. }
            | Self::ReadByte { address }
            | Self::WriteByteData { address, .. }
            | Self::ReadByteData { address, .. }
            | Self::WriteWordData { address, .. }
            | Self::ReadWordData { address, .. }
            | Self::WriteBlock { address, .. }
            | Self::ReadBlock { address, .. } => Some(address),
            Self::Scan | Self::Reset => None,
        }
    }
}

/// Outcome of a bus transaction as reported by the server.
#[allow(clippy::exhaustive_enums)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Transaction completed.
    Ok = 0x00,
    /// The addressed device did not acknowledge.
    NoDevice = 0x01,
    /// Low-level transfer fault (arbitration loss, bus timeout).
    BusError = 0x02,
    /// The request frame was malformed.
    ProtocolError = 0x03,
}

impl TryFrom<u8> for Status {
    type Error = crate::ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Self::Ok,
            0x01 => Self::NoDevice,
            0x02 => Self::BusError,
            0x03 => Self::ProtocolError,
            other => return Err(crate::ProtocolError::UnknownStatus(other)),
        })
    }
}

/// Response to a single [`BusOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct BusResponse {
    /// Hardware-level outcome.
    pub status: Status,
    /// Result bytes; empty unless `status` is [`Status::Ok`] for a read.
    pub payload: Vec<u8>,
}

impl BusResponse {
    /// A successful response without data.
    pub const fn ok() -> Self {
        Self {
            status: Status::Ok,
            payload: Vec::new(),
        }
    }

    /// A successful response carrying read data.
    pub const fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// A response with the given status and no payload.
    pub const fn failure(status: Status) -> Self {
        Self {
            status,
            payload: Vec::new(),
        }
    }

    /// Returns `true` if the status is [`Status::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }
}

/// Packs a set of addresses into the SCAN bitmap (bit `a % 8` of byte `a / 8`).
pub fn encode_scan_bitmap(addresses: &[u8]) -> [u8; SCAN_BITMAP_LEN] {
    let mut bitmap = [0u8; SCAN_BITMAP_LEN];
    for &a in addresses.iter().filter(|&&a| a < 0x80) {
        bitmap[usize::from(a / 8)] |= 1 << (a % 8);
    }
    bitmap
}

/// Unpacks a SCAN bitmap into ascending addresses within `0x03..=0x77`.
pub fn decode_scan_bitmap(bitmap: &[u8]) -> Vec<u8> {
    (FIRST_ADDRESS..=LAST_ADDRESS)
        .filter(|&a| {
            bitmap
                .get(usize::from(a / 8))
                .is_some_and(|byte| byte & (1 << (a % 8)) != 0)
        })
        .collect()
}
