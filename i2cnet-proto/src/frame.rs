//! Pure byte-level encoding and decoding of request and response frames.

use crate::error::ProtocolError;
use crate::message::{BusOperation, BusResponse, MAX_BLOCK, Opcode, Status};

/// Size of a request header: opcode, address, register, length.
pub const REQUEST_HEADER_LEN: usize = 4;

/// Size of a response header: status, length.
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Checks a payload length against [`MAX_BLOCK`] and narrows it to a length byte.
fn block_len(len: usize) -> Result<u8, ProtocolError> {
    u8::try_from(len)
        .ok()
        .filter(|&n| usize::from(n) <= MAX_BLOCK)
        .ok_or(ProtocolError::Oversized { len })
}

/// Encodes a request as a complete frame.
///
/// Fails only for block operations whose sizes cannot be framed.
pub fn encode_request(op: &BusOperation) -> Result<Vec<u8>, ProtocolError> {
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + MAX_BLOCK);
    let (address, register, length): (u8, u8, u8) = match *op {
        BusOperation::WriteQuick { address } | BusOperation::ReadByte { address } => {
            (address, 0, 0)
        }
        BusOperation::WriteByte { address, .. } => (address, 0, 1),
        BusOperation::WriteByteData { address, register, .. } => (address, register, 1),
        BusOperation::ReadByteData { address, register }
        | BusOperation::ReadWordData { address, register } => (address, register, 0),
        BusOperation::WriteWordData { address, register, .. } => (address, register, 2),
        BusOperation::WriteBlock {
            address,
            register,
            ref data,
        } => (address, register, block_len(data.len())?),
        BusOperation::ReadBlock {
            address,
            register,
            length,
        } => {
            if length == 0 || usize::from(length) > MAX_BLOCK {
                return Err(ProtocolError::InvalidReadLength(usize::from(length)));
            }
            (address, register, length)
        }
        BusOperation::Scan | BusOperation::Reset => (0, 0, 0),
    };
    frame.extend_from_slice(&[op.opcode() as u8, address, register, length]);

    match *op {
        BusOperation::WriteByte { value, .. } | BusOperation::WriteByteData { value, .. } => {
            frame.push(value);
        }
        BusOperation::WriteWordData { value, .. } => frame.extend_from_slice(&value.to_le_bytes()),
        BusOperation::WriteBlock { ref data, .. } => frame.extend_from_slice(data),
        _ => {}
    }
    Ok(frame)
}

/// Number of payload bytes following a request header.
///
/// Only framing is checked here: an unknown opcode or an oversized payload
/// leaves the reader unable to find the next frame. Semantic length checks
/// happen in [`decode_request`] once the whole frame has been consumed.
pub fn request_payload_len(header: &[u8; REQUEST_HEADER_LEN]) -> Result<usize, ProtocolError> {
    let opcode = Opcode::try_from(header[0])?;
    let length = usize::from(header[3]);
    if !opcode.carries_payload() {
        return Ok(0);
    }
    if length > MAX_BLOCK {
        return Err(ProtocolError::Oversized { len: length });
    }
    Ok(length)
}

/// Decodes one complete request frame.
pub fn decode_request(frame: &[u8]) -> Result<BusOperation, ProtocolError> {
    let header: &[u8; REQUEST_HEADER_LEN] = frame
        .get(..REQUEST_HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtocolError::FrameSize {
            expected: REQUEST_HEADER_LEN,
            actual: frame.len(),
        })?;
    let payload_len = request_payload_len(header)?;
    let payload = &frame[REQUEST_HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(ProtocolError::FrameSize {
            expected: REQUEST_HEADER_LEN + payload_len,
            actual: frame.len(),
        });
    }

    let [code, address, register, length] = *header;
    let opcode = Opcode::try_from(code)?;
    let length = usize::from(length);
    let expect = |expected: usize| {
        if length == expected {
            Ok(())
        } else {
            Err(ProtocolError::LengthMismatch {
                opcode,
                expected,
                actual: length,
            })
        }
    };

    Ok(match opcode {
        Opcode::WriteQuick => {
            expect(0)?;
            BusOperation::WriteQuick { address }
        }
        Opcode::WriteByte => {
            expect(1)?;
            BusOperation::WriteByte {
                address,
                value: payload[0],
            }
        }
        Opcode::ReadByte => {
            expect(0)?;
            BusOperation::ReadByte { address }
        }
        Opcode::WriteByteData => {
            expect(1)?;
            BusOperation::WriteByteData {
                address,
                register,
                value: payload[0],
            }
        }
        Opcode::ReadByteData => {
            expect(0)?;
            BusOperation::ReadByteData { address, register }
        }
        Opcode::WriteWordData => {
            expect(2)?;
            BusOperation::WriteWordData {
                address,
                register,
                value: u16::from_le_bytes([payload[0], payload[1]]),
            }
        }
        Opcode::ReadWordData => {
            expect(0)?;
            BusOperation::ReadWordData { address, register }
        }
        Opcode::WriteBlock => BusOperation::WriteBlock {
            address,
            register,
            data: payload.to_vec(),
        },
        Opcode::ReadBlock => {
            if length == 0 || length > MAX_BLOCK {
                return Err(ProtocolError::InvalidReadLength(length));
            }
            BusOperation::ReadBlock {
                address,
                register,
                length: header[3],
            }
        }
        Opcode::Scan => {
            expect(0)?;
            BusOperation::Scan
        }
        Opcode::Reset => {
            expect(0)?;
            BusOperation::Reset
        }
    })
}

/// Encodes a response as a complete frame.
pub fn encode_response(resp: &BusResponse) -> Result<Vec<u8>, ProtocolError> {
    if !resp.is_ok() && !resp.payload.is_empty() {
        return Err(ProtocolError::UnexpectedPayload {
            status: resp.status,
            len: resp.payload.len(),
        });
    }
    let len = block_len(resp.payload.len())?;
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + resp.payload.len());
    frame.extend_from_slice(&[resp.status as u8, len]);
    frame.extend_from_slice(&resp.payload);
    Ok(frame)
}

/// Number of payload bytes following a response header.
pub fn response_payload_len(header: &[u8; RESPONSE_HEADER_LEN]) -> Result<usize, ProtocolError> {
    Status::try_from(header[0])?;
    let len = usize::from(header[1]);
    if len > MAX_BLOCK {
        return Err(ProtocolError::Oversized { len });
    }
    Ok(len)
}

/// Decodes one complete response frame.
pub fn decode_response(frame: &[u8]) -> Result<BusResponse, ProtocolError> {
    let header: &[u8; RESPONSE_HEADER_LEN] = frame
        .get(..RESPONSE_HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtocolError::FrameSize {
            expected: RESPONSE_HEADER_LEN,
            actual: frame.len(),
        })?;
    let len = response_payload_len(header)?;
    let payload = &frame[RESPONSE_HEADER_LEN..];
    if payload.len() != len {
        return Err(ProtocolError::FrameSize {
            expected: RESPONSE_HEADER_LEN + len,
            actual: frame.len(),
        });
    }
    let status = Status::try_from(header[0])?;
    if status != Status::Ok && len != 0 {
        return Err(ProtocolError::UnexpectedPayload { status, len });
    }
    Ok(BusResponse {
        status,
        payload: payload.to_vec(),
    })
}
