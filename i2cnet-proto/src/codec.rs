//! Frame I/O over blocking (`Read`/`Write`) and async (tokio) streams.
//!
//! Readers fetch the fixed-size header first, derive the payload size from
//! it, then read exactly that many bytes. A frame split across several TCP
//! segments, or several frames coalesced into one, decode the same way.

use std::io::{Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::frame::{
    REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN, decode_request, decode_response, encode_request,
    encode_response, request_payload_len, response_payload_len,
};
use crate::message::{BusOperation, BusResponse};

/// Encodes `op` and writes it to `w` as one frame.
pub fn write_request<W: Write>(w: &mut W, op: &BusOperation) -> Result<(), FrameError> {
    let frame = encode_request(op)?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Reads one request frame from `r`.
pub fn read_request<R: Read>(r: &mut R) -> Result<BusOperation, FrameError> {
    let mut header = [0u8; REQUEST_HEADER_LEN];
    r.read_exact(&mut header)?;
    let len = request_payload_len(&header)?;
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + len);
    frame.extend_from_slice(&header);
    frame.resize(REQUEST_HEADER_LEN + len, 0);
    r.read_exact(&mut frame[REQUEST_HEADER_LEN..])?;
    Ok(decode_request(&frame)?)
}

/// Encodes `resp` and writes it to `w` as one frame.
pub fn write_response<W: Write>(w: &mut W, resp: &BusResponse) -> Result<(), FrameError> {
    let frame = encode_response(resp)?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Reads one response frame from `r`.
pub fn read_response<R: Read>(r: &mut R) -> Result<BusResponse, FrameError> {
    let mut header = [0u8; RESPONSE_HEADER_LEN];
    r.read_exact(&mut header)?;
    let len = response_payload_len(&header)?;
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + len);
    frame.extend_from_slice(&header);
    frame.resize(RESPONSE_HEADER_LEN + len, 0);
    r.read_exact(&mut frame[RESPONSE_HEADER_LEN..])?;
    Ok(decode_response(&frame)?)
}

/// Reads one request frame from an async stream.
#[cfg(feature = "async")]
pub async fn recv_request<R>(r: &mut R) -> Result<BusOperation, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; REQUEST_HEADER_LEN];
    r.read_exact(&mut header).await?;
    let len = request_payload_len(&header)?;
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + len);
    frame.extend_from_slice(&header);
    frame.resize(REQUEST_HEADER_LEN + len, 0);
    r.read_exact(&mut frame[REQUEST_HEADER_LEN..]).await?;
    Ok(decode_request(&frame)?)
}

/// Writes one response frame to an async stream and flushes it.
#[cfg(feature = "async")]
pub async fn send_response<W>(w: &mut W, resp: &BusResponse) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_response(resp)?;
    w.write_all(&frame).await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;

    use super::*;
    use crate::{ProtocolError, Status};

    /// Yields its data in two reads split at `at`, like two TCP segments.
    struct SplitReader {
        data: Vec<u8>,
        at: usize,
        pos: usize,
    }

    impl Read for SplitReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let end = if self.pos < self.at {
                self.at
            } else {
                self.data.len()
            };
            let n = buf.len().min(end - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn block_write() -> BusOperation {
        BusOperation::WriteBlock {
            address: 0x50,
            register: 0x20,
            data: (0..32).collect(),
        }
    }

    #[test]
    fn roundtrip_request_stream() {
        let mut buf = Vec::new();
        write_request(&mut buf, &block_write()).unwrap();

        let mut cursor = io::Cursor::new(&buf);
        assert_eq!(read_request(&mut cursor).unwrap(), block_write());
    }

    #[test]
    fn split_delivery_decodes_identically() {
        let frame = encode_request(&block_write()).unwrap();
        for at in 0..=frame.len() {
            let mut r = SplitReader {
                data: frame.clone(),
                at,
                pos: 0,
            };
            assert_eq!(read_request(&mut r).unwrap(), block_write(), "split at {at}");
        }
    }

    #[test]
    fn coalesced_frames_decode_in_order() {
        let mut buf = Vec::new();
        write_response(&mut buf, &BusResponse::with_payload(vec![0x55])).unwrap();
        write_response(&mut buf, &BusResponse::failure(Status::NoDevice)).unwrap();
        write_response(&mut buf, &BusResponse::ok()).unwrap();

        let mut cursor = io::Cursor::new(&buf);
        assert_eq!(read_response(&mut cursor).unwrap().payload, vec![0x55]);
        assert_eq!(read_response(&mut cursor).unwrap().status, Status::NoDevice);
        assert!(read_response(&mut cursor).unwrap().is_ok());
        assert!(read_response(&mut cursor).unwrap_err().is_eof());
    }

    #[test]
    fn truncated_frame_is_eof() {
        let frame = encode_request(&block_write()).unwrap();
        let mut cursor = io::Cursor::new(&frame[..10]);
        assert!(read_request(&mut cursor).unwrap_err().is_eof());
    }

    #[test]
    fn unknown_opcode_stops_after_header() {
        let bytes = [0xEE, 0x50, 0x00, 0x04, 1, 2, 3, 4];
        let mut cursor = io::Cursor::new(&bytes[..]);
        let err = read_request(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolError::UnknownOpcode(0xEE))
        ));
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn write_request_refuses_oversized_block() {
        let op = BusOperation::WriteBlock {
            address: 0x50,
            register: 0,
            data: vec![0; 33],
        };
        let mut buf = Vec::new();
        assert!(write_request(&mut buf, &op).is_err());
        assert!(buf.is_empty());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_split_delivery() {
        let frame = encode_request(&block_write()).unwrap();
        for at in [1, 3, 4, 5, 20, frame.len() - 1] {
            let (mut client, mut server) = tokio::io::duplex(64);
            let (head, tail) = frame.split_at(at);
            let (head, tail) = (head.to_vec(), tail.to_vec());
            let writer = tokio::spawn(async move {
                client.write_all(&head).await.unwrap();
                client.flush().await.unwrap();
                tokio::task::yield_now().await;
                client.write_all(&tail).await.unwrap();
                client
            });
            let op = recv_request(&mut server).await.unwrap();
            assert_eq!(op, block_write(), "split at {at}");
            drop(writer.await.unwrap());
        }
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_response_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        send_response(&mut server, &BusResponse::with_payload(vec![0xEF, 0xBE]))
            .await
            .unwrap();
        let mut header = [0u8; RESPONSE_HEADER_LEN + 2];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header, [Status::Ok as u8, 2, 0xEF, 0xBE]);
    }
}
