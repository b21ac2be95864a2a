//! A single blocking client connection to an i2cnet server.
//!
//! The protocol is strict request/response with no pipelining: [`Session::send`]
//! writes one frame and reads exactly one response frame before returning, so
//! responses need no correlation id.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use i2cnet_proto::{BusOperation, BusResponse, Status};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// No socket: never connected, or closed by the caller.
    Disconnected,
    /// Socket open and aligned on a frame boundary.
    Connected,
    /// The last exchange or connect attempt failed; the socket was dropped.
    Faulted,
}

/// Owns the TCP stream to the server and serializes requests over it.
///
/// Any transport or framing failure drops the socket and moves the session
/// to [`SessionState::Faulted`]. The next [`send`](Self::send) makes exactly
/// one reconnect attempt before giving up with [`Error::Transport`].
#[derive(Debug)]
pub struct Session {
    /// Target address and timeouts.
    config: ClientConfig,
    /// Open stream, if any.
    stream: Option<TcpStream>,
    /// Current connection state.
    state: SessionState,
    /// Connection attempts made so far, including the first.
    connect_attempts: u64,
}

impl Session {
    /// A disconnected session; the first [`send`](Self::send) connects.
    pub const fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
            state: SessionState::Disconnected,
            connect_attempts: 0,
        }
    }

    /// Connects immediately, failing with [`Error::Transport`] if the server
    /// is unreachable.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.reconnect()?;
        Ok(session)
    }

    /// Current connection state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Connection attempts made so far, including the initial connect.
    pub const fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Settings this session connects with.
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends one operation and blocks until its response arrives.
    ///
    /// Hardware outcomes come back as the response status. Only link and
    /// framing failures are errors here.
    pub fn send(&mut self, op: &BusOperation) -> Result<BusResponse> {
        // Encode before touching the socket so a bad operation sends nothing.
        let frame = i2cnet_proto::encode_request(op)?;

        if self.stream.as_ref().is_some_and(peer_closed) {
            // The server drops connections that stay idle too long.
            debug!(host = %self.config.host, "server closed the connection, reconnecting");
            self.stream = None;
        }
        if self.stream.is_none() {
            self.reconnect()?;
        }
        let outcome = match self.stream.as_mut() {
            Some(stream) => exchange(stream, &frame),
            None => Err(Error::Transport(io::ErrorKind::NotConnected.into())),
        };

        match outcome {
            Ok(resp) => {
                debug!(?op, status = ?resp.status, "exchange complete");
                if resp.status == Status::ProtocolError {
                    // The server closes the connection after rejecting a frame.
                    self.fault();
                }
                Ok(resp)
            }
            Err(e) => {
                warn!(error = %e, ?op, "exchange failed, session faulted");
                self.fault();
                Err(e)
            }
        }
    }

    /// Closes the socket. A later [`send`](Self::send) reconnects.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(host = %self.config.host, port = self.config.port, "session closed");
        }
        self.state = SessionState::Disconnected;
    }

    /// Drops the socket and marks the session faulted.
    fn fault(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = SessionState::Faulted;
    }

    /// Makes one connection attempt, replacing any existing stream.
    fn reconnect(&mut self) -> Result<()> {
        self.stream = None;
        self.connect_attempts += 1;
        match open_stream(&self.config) {
            Ok(stream) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    attempt = self.connect_attempts,
                    "connected"
                );
                self.stream = Some(stream);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    error = %e,
                    "connect failed"
                );
                self.state = SessionState::Faulted;
                Err(Error::Transport(e))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Whether the server has closed its end since the last exchange.
///
/// Between exchanges nothing may arrive, so any readable state (EOF, reset,
/// or stray bytes) means the stream can no longer be used.
fn peer_closed(stream: &TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return true;
    }
    let mut buf = [0u8; 1];
    let idle = matches!(stream.peek(&mut buf), Err(ref e) if e.kind() == io::ErrorKind::WouldBlock);
    stream.set_nonblocking(false).is_err() || !idle
}

/// Writes one encoded request and reads one response frame.
fn exchange(stream: &mut TcpStream, frame: &[u8]) -> Result<BusResponse> {
    stream.write_all(frame)?;
    stream.flush()?;
    Ok(i2cnet_proto::read_response(stream)?)
}

/// Resolves the configured host and connects to the first address that answers.
fn open_stream(config: &ClientConfig) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout_duration()) {
            Ok(stream) => {
                stream.set_read_timeout(Some(config.io_timeout_duration()))?;
                stream.set_write_timeout(Some(config.io_timeout_duration()))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", config.host),
        )
    }))
}
