//! Error types for frame encoding and decoding.

use std::io;

use crate::message::{MAX_BLOCK, Opcode, Status};

/// A frame that violates the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The opcode byte does not name a known operation.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// The status byte does not name a known outcome.
    #[error("unknown status {0:#04x}")]
    UnknownStatus(u8),

    /// A payload length exceeds the frame limit.
    #[error("length {len} exceeds the {MAX_BLOCK}-byte frame limit")]
    Oversized {
        /// Declared or supplied length.
        len: usize,
    },

    /// The number of bytes supplied does not match the header.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize {
        /// Size implied by the header.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// The length byte disagrees with the fixed size of the opcode.
    #[error("{opcode:?} requires length {expected}, got {actual}")]
    LengthMismatch {
        /// Opcode of the offending request.
        opcode: Opcode,
        /// Length the opcode requires.
        expected: usize,
        /// Length found in the header.
        actual: usize,
    },

    /// A block read asked for zero or more than [`MAX_BLOCK`] bytes.
    #[error("block read length {0} outside 1..={MAX_BLOCK}")]
    InvalidReadLength(usize),

    /// A non-OK response carried payload bytes, or a read returned the wrong size.
    #[error("{status:?} response with unexpected {len}-byte payload")]
    UnexpectedPayload {
        /// Status of the offending response.
        status: Status,
        /// Payload size found.
        len: usize,
    },

    /// The peer answered with [`Status::ProtocolError`].
    #[error("peer rejected the request as malformed")]
    Rejected,
}

impl ProtocolError {
    /// Whether the offending frame was consumed in full.
    ///
    /// When `true` the stream is still aligned on a frame boundary and the
    /// server can answer with [`Status::ProtocolError`]. When `false` the
    /// framing is lost and the connection must be closed without a reply.
    pub const fn boundary_known(&self) -> bool {
        !matches!(
            self,
            Self::UnknownOpcode(_)
                | Self::UnknownStatus(_)
                | Self::Oversized { .. }
                | Self::FrameSize { .. }
        )
    }
}

/// Failure reading or writing a frame on a stream.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The underlying stream failed, timed out, or hit EOF.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The bytes received do not form a valid frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl FrameError {
    /// Returns `true` if the stream ended before a full frame arrived.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}
