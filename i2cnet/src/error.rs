//! Error types for bus operations.

use i2cnet_proto::{FrameError, MAX_BLOCK, ProtocolError};

/// Alias for `Result<T, i2cnet::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`SmBus`](crate::SmBus) operations.
///
/// Hardware outcomes ([`Error::NoDevice`], [`Error::Bus`]) are kept apart from
/// link failures ([`Error::Transport`], [`Error::Protocol`]) so callers can
/// tell "device absent" from "server unreachable".
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Connecting to or talking with the server failed or timed out.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// A malformed frame was sent or received.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// The addressed device did not acknowledge.
    #[error("no device acknowledged at address {address:#04x}")]
    NoDevice {
        /// 7-bit device address.
        address: u8,
    },

    /// A low-level transfer fault on the physical bus.
    #[error("bus error: {reason}")]
    Bus {
        /// Human-readable description of the fault.
        reason: String,
    },

    /// A block write exceeded the SMBus block limit.
    #[error("block of {len} bytes exceeds the {MAX_BLOCK}-byte SMBus limit")]
    BlockTooLarge {
        /// Size of the rejected block.
        len: usize,
    },

    /// A block read asked for zero or more than [`MAX_BLOCK`] bytes.
    #[error("block read length {len} outside 1..={MAX_BLOCK}")]
    InvalidLength {
        /// Requested length.
        len: usize,
    },
}

impl Error {
    /// Returns `true` for link-level failures that a reconnect may cure.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the device did not acknowledge.
    pub const fn is_no_device(&self) -> bool {
        matches!(self, Self::NoDevice { .. })
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(e) => Self::Transport(e),
            FrameError::Protocol(e) => Self::Protocol(e),
            // `FrameError` is non-exhaustive.
            other => Self::Transport(std::io::Error::other(other)),
        }
    }
}
