//! Client-side bus handle that forwards every call to a remote server.

use i2cnet_proto::{BusOperation, ProtocolError, SCAN_BITMAP_LEN, Status};

use crate::bus::{SmBus, check_block_read, check_block_write};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::session::Session;

/// An [`SmBus`] whose transactions run on another machine's bus.
///
/// Each call becomes one request over the owned [`Session`] and blocks until
/// the server answers. The connection opens with [`RemoteBus::open`] and is
/// released by [`RemoteBus::close`] or on drop, whichever comes first, on
/// every exit path.
///
/// ```no_run
/// use i2cnet::{ClientConfig, RemoteBus, SmBus};
///
/// let mut bus = RemoteBus::open(ClientConfig::new("beaglebone.local", 8888))?;
/// let id = bus.read_byte_data(0x68, 0x75)?;
/// bus.close();
/// # Ok::<(), i2cnet::Error>(())
/// ```
#[derive(Debug)]
pub struct RemoteBus {
    /// Connection to the server.
    session: Session,
}

impl RemoteBus {
    /// Connects to the server described by `config`.
    pub fn open(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            session: Session::connect(config)?,
        })
    }

    /// Connects to `host:port` with default timeouts.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::open(ClientConfig::new(host, port))
    }

    /// Wraps an existing session.
    pub const fn from_session(session: Session) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Releases the connection.
    pub fn close(mut self) {
        self.session.close();
    }

    /// Runs one operation remotely and returns the OK payload.
    fn call(&mut self, op: &BusOperation) -> Result<Vec<u8>> {
        let resp = self.session.send(op)?;
        match resp.status {
            Status::Ok => Ok(resp.payload),
            Status::NoDevice => Err(Error::NoDevice {
                address: op.address().unwrap_or_default(),
            }),
            Status::BusError => Err(Error::Bus {
                reason: match op.address() {
                    Some(a) => format!("{:?} at {a:#04x} failed on the remote bus", op.opcode()),
                    None => format!("{:?} failed on the remote bus", op.opcode()),
                },
            }),
            Status::ProtocolError => Err(Error::Protocol(ProtocolError::Rejected)),
        }
    }

    /// Runs one operation and checks its payload has exactly `len` bytes.
    fn call_sized(&mut self, op: &BusOperation, len: usize) -> Result<Vec<u8>> {
        let payload = self.call(op)?;
        if payload.len() != len {
            return Err(Error::Protocol(ProtocolError::UnexpectedPayload {
                status: Status::Ok,
                len: payload.len(),
            }));
        }
        Ok(payload)
    }
}

impl SmBus for RemoteBus {
    fn write_quick(&mut self, address: u8) -> Result<()> {
        self.call_sized(&BusOperation::WriteQuick { address }, 0)
            .map(drop)
    }

    fn write_byte(&mut self, address: u8, value: u8) -> Result<()> {
        self.call_sized(&BusOperation::WriteByte { address, value }, 0)
            .map(drop)
    }

    fn read_byte(&mut self, address: u8) -> Result<u8> {
        let payload = self.call_sized(&BusOperation::ReadByte { address }, 1)?;
        Ok(payload[0])
    }

    fn write_byte_data(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        let op = BusOperation::WriteByteData {
            address,
            register,
            value,
        };
        self.call_sized(&op, 0).map(drop)
    }

    fn read_byte_data(&mut self, address: u8, register: u8) -> Result<u8> {
        let op = BusOperation::ReadByteData { address, register };
        Ok(self.call_sized(&op, 1)?[0])
    }

    fn write_word_data(&mut self, address: u8, register: u8, value: u16) -> Result<()> {
        let op = BusOperation::WriteWordData {
            address,
            register,
            value,
        };
        self.call_sized(&op, 0).map(drop)
    }

    fn read_word_data(&mut self, address: u8, register: u8) -> Result<u16> {
        let op = BusOperation::ReadWordData { address, register };
        let payload = self.call_sized(&op, 2)?;
        Ok(u16::from_le_bytes([payload[0], payload[1]]))
    }

    fn write_i2c_block_data(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()> {
        check_block_write(data)?;
        let op = BusOperation::WriteBlock {
            address,
            register,
            data: data.to_vec(),
        };
        self.call_sized(&op, 0).map(drop)
    }

    fn read_i2c_block_data(&mut self, address: u8, register: u8, length: u8) -> Result<Vec<u8>> {
        check_block_read(length)?;
        let op = BusOperation::ReadBlock {
            address,
            register,
            length,
        };
        self.call_sized(&op, usize::from(length))
    }

    /// Scans on the server in a single round trip.
    fn scan(&mut self) -> Result<Vec<u8>> {
        let bitmap = self.call_sized(&BusOperation::Scan, SCAN_BITMAP_LEN)?;
        Ok(i2cnet_proto::decode_scan_bitmap(&bitmap))
    }

    /// Asks the server to reopen its bus handle.
    fn reset(&mut self) -> Result<()> {
        self.call_sized(&BusOperation::Reset, 0).map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use i2cnet_proto::{BusResponse, encode_scan_bitmap, read_request, write_response};

    use super::*;
    use crate::SessionState;

    /// Serves one connection, answering each expected request in turn.
    fn scripted(script: Vec<(BusOperation, BusResponse)>) -> (ClientConfig, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            for (expected, resp) in script {
                assert_eq!(read_request(&mut s).unwrap(), expected);
                write_response(&mut s, &resp).unwrap();
            }
        });
        let config = ClientConfig::new("127.0.0.1", port).io_timeout(Duration::from_secs(2));
        (config, handle)
    }

    #[test]
    fn typed_results() {
        let (config, server) = scripted(vec![
            (
                BusOperation::ReadByteData {
                    address: 0x68,
                    register: 0x75,
                },
                BusResponse::with_payload(vec![0x71]),
            ),
            (
                BusOperation::ReadWordData {
                    address: 0x40,
                    register: 0x02,
                },
                BusResponse::with_payload(vec![0x34, 0x12]),
            ),
            (
                BusOperation::ReadBlock {
                    address: 0x50,
                    register: 0x00,
                    length: 3,
                },
                BusResponse::with_payload(vec![1, 2, 3]),
            ),
            (
                BusOperation::Scan,
                BusResponse::with_payload(encode_scan_bitmap(&[0x50, 0x68]).to_vec()),
            ),
        ]);

        let mut bus = RemoteBus::open(config).unwrap();
        assert_eq!(bus.read_byte_data(0x68, 0x75).unwrap(), 0x71);
        assert_eq!(bus.read_word_data(0x40, 0x02).unwrap(), 0x1234);
        assert_eq!(bus.read_i2c_block_data(0x50, 0x00, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(bus.scan().unwrap(), vec![0x50, 0x68]);
        bus.close();
        server.join().unwrap();
    }

    #[test]
    fn status_maps_to_distinct_errors() {
        let (config, server) = scripted(vec![
            (
                BusOperation::ReadByte { address: 0x51 },
                BusResponse::failure(Status::NoDevice),
            ),
            (
                BusOperation::WriteByte {
                    address: 0x20,
                    value: 1,
                },
                BusResponse::failure(Status::BusError),
            ),
            (BusOperation::Reset, BusResponse::failure(Status::ProtocolError)),
        ]);

        let mut bus = RemoteBus::open(config).unwrap();
        assert!(matches!(
            bus.read_byte(0x51),
            Err(Error::NoDevice { address: 0x51 })
        ));
        assert_eq!(bus.session().state(), SessionState::Connected);
        assert!(matches!(bus.write_byte(0x20, 1), Err(Error::Bus { .. })));
        assert!(matches!(
            bus.reset(),
            Err(Error::Protocol(ProtocolError::Rejected))
        ));
        assert_eq!(bus.session().state(), SessionState::Faulted);
        drop(bus);
        server.join().unwrap();
    }

    #[test]
    fn wrong_payload_size_is_protocol_error() {
        let (config, server) = scripted(vec![(
            BusOperation::ReadByte { address: 0x50 },
            BusResponse::with_payload(vec![1, 2]),
        )]);
        let mut bus = RemoteBus::open(config).unwrap();
        assert!(matches!(
            bus.read_byte(0x50),
            Err(Error::Protocol(ProtocolError::UnexpectedPayload { len: 2, .. }))
        ));
        drop(bus);
        server.join().unwrap();
    }

    #[test]
    fn oversized_block_fails_locally() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            s.read_to_end(&mut received).unwrap();
            received
        });

        let mut bus = RemoteBus::connect("127.0.0.1", port).unwrap();
        assert!(matches!(
            bus.write_i2c_block_data(0x50, 0x00, &[0xAA; 33]),
            Err(Error::BlockTooLarge { len: 33 })
        ));
        assert!(matches!(
            bus.read_i2c_block_data(0x50, 0x00, 33),
            Err(Error::InvalidLength { len: 33 })
        ));
        assert_eq!(bus.session().state(), SessionState::Connected);
        bus.close();

        assert!(server.join().unwrap().is_empty());
    }
}
