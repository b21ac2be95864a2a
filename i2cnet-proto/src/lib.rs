//! Wire protocol for remote I2C/SMBus transactions.
//!
//! A request frame is `[opcode][address][register][length][payload]` and a
//! response frame is `[status][length][payload]`. Every field is one byte and
//! payloads never exceed [`MAX_BLOCK`] bytes, so a reader always knows where a
//! frame ends from its header alone. This makes the format safe over any
//! reliable byte stream that may split or coalesce writes (TCP, Unix socket).
//!
//! Blocking frame I/O is always available; the `async` feature adds the
//! tokio counterparts used by the server.

mod codec;
mod error;
mod frame;
mod message;

pub use codec::{read_request, read_response, write_request, write_response};
#[cfg(feature = "async")]
pub use codec::{recv_request, send_response};
pub use error::{FrameError, ProtocolError};
pub use frame::{
    REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN, decode_request, decode_response, encode_request,
    encode_response, request_payload_len, response_payload_len,
};
pub use message::{
    BusOperation, BusResponse, DEFAULT_PORT, FIRST_ADDRESS, LAST_ADDRESS, MAX_BLOCK, Opcode,
    PROTOCOL_VERSION, SCAN_BITMAP_LEN, Status, decode_scan_bitmap, encode_scan_bitmap,
    is_valid_address,
};
