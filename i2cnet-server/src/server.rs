//! TCP listener and per-connection request dispatch.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use i2cnet_proto::{BusResponse, FrameError, Status};
use tokio::io::{AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::gateway::Gateway;

/// Pause after a failed `accept` so descriptor exhaustion cannot spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listener, ready to [`serve`](Self::serve).
#[derive(Debug)]
pub struct Server {
    /// Bound TCP listener.
    listener: TcpListener,
    /// Connection cap, at least one.
    max_connections: usize,
    /// How long a connection may wait between requests.
    idle_timeout: Option<Duration>,
}

impl Server {
    /// Binds the listen address from `config`.
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            max_connections: config.max_connections.max(1),
            idle_timeout: config.idle_timeout_duration(),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Each connection runs in its own task and may issue any number of
    /// requests. Connections beyond the configured limit are closed right
    /// after they are accepted, and connections that stay silent past the
    /// idle timeout are closed to release their slot.
    pub async fn serve(
        self,
        gateway: Arc<Gateway>,
        shutdown: impl Future<Output = ()>,
    ) -> io::Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_connections));
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                warn!(%peer, limit = self.max_connections, "connection limit reached, dropping");
                continue;
            };

            let gateway = Arc::clone(&gateway);
            let idle_timeout = self.idle_timeout;
            tokio::spawn(async move {
                info!(%peer, "client connected");
                match session(stream, gateway, idle_timeout).await {
                    Ok(()) => info!(%peer, "client disconnected"),
                    Err(e) => warn!(%peer, error = %e, "session error"),
                }
                drop(permit);
            });
        }
    }
}

/// Serves one connection: read a request, run it, answer, repeat.
async fn session(
    stream: TcpStream,
    gateway: Arc<Gateway>,
    idle_timeout: Option<Duration>,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut r = BufReader::new(reader);
    let mut w = BufWriter::new(writer);

    loop {
        let next = i2cnet_proto::recv_request(&mut r);
        let received = match idle_timeout {
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, next).await {
                    received
                } else {
                    info!(?limit, "idle timeout, closing");
                    return Ok(());
                }
            }
            None => next.await,
        };
        let op = match received {
            Ok(op) => op,
            // Clean disconnect.
            Err(e) if e.is_eof() => return Ok(()),
            Err(FrameError::Protocol(e)) => {
                if e.boundary_known() {
                    warn!(error = %e, "malformed request, rejecting");
                    reply(&mut w, &BusResponse::failure(Status::ProtocolError)).await?;
                } else {
                    warn!(error = %e, "framing lost, closing");
                }
                return Ok(());
            }
            Err(FrameError::Io(e)) => return Err(e),
            Err(e) => return Err(io::Error::other(e)),
        };

        debug!(?op, "dispatching");
        let gw = Arc::clone(&gateway);
        let resp = match tokio::task::spawn_blocking(move || gw.execute(&op)).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "bus task failed");
                BusResponse::failure(Status::BusError)
            }
        };
        reply(&mut w, &resp).await?;
    }
}

/// Sends one response frame.
async fn reply<W: AsyncWrite + Unpin>(w: &mut W, resp: &BusResponse) -> io::Result<()> {
    i2cnet_proto::send_response(w, resp)
        .await
        .map_err(|e| match e {
            FrameError::Io(e) => e,
            other => io::Error::other(other),
        })
}
