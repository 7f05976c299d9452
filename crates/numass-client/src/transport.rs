//! Synchronous envelope transport.
//!
//! One request in flight per connection: the request is written and flushed,
//! then the caller blocks until exactly one reply envelope is assembled. The
//! socket read timeout bounds each `read` call only; what a timeout means for
//! the request is decided by [`ReadPolicy`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;

use numass_core::error::{NumassError, Result};
use numass_core::protocol::envelope::declared_total;
use numass_core::protocol::message;
use numass_core::protocol::{Envelope, EnvelopeCodec};

use crate::config::{ClientConfig, ReadPolicy};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 8 * 1024;

enum Connection {
    Disconnected,
    Connected(TcpStream),
    Closed,
}

/// Single-owner client handle.
///
/// `Disconnected -> Connected -> Closed`. A hard I/O error drops the socket
/// back to `Disconnected` and the next request reconnects; `close` is terminal.
pub struct NumassClient {
    config: ClientConfig,
    codec: EnvelopeCodec,
    conn: Connection,
    buf: BytesMut,
}

impl NumassClient {
    /// Client in the `Disconnected` state.
    pub fn new(config: ClientConfig) -> Self {
        let codec = EnvelopeCodec::new(config.dialect);
        Self {
            config,
            codec,
            conn: Connection::Disconnected,
            buf: BytesMut::new(),
        }
    }

    /// Open a connection to `address:port` with default settings.
    pub fn connect_to(address: &str, port: u16) -> Result<Self> {
        let mut client = Self::new(ClientConfig::new(address, port));
        client.connect()?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.conn, Connection::Connected(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.conn, Connection::Closed)
    }

    /// Open the socket. No-op when already connected.
    pub fn connect(&mut self) -> Result<()> {
        match self.conn {
            Connection::Connected(_) => return Ok(()),
            Connection::Closed => return Err(NumassError::transport("client is closed")),
            Connection::Disconnected => {}
        }

        let endpoint = self.config.endpoint();
        let addrs = endpoint.to_socket_addrs().map_err(|e| {
            NumassError::transport(format!("invalid address '{endpoint}': {e}"))
        })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.config.read_timeout()))?;
                    stream.set_nodelay(true)?;
                    tracing::info!(%addr, "connected");
                    self.buf.clear();
                    self.conn = Connection::Connected(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(NumassError::transport(format!(
            "failed to connect to {endpoint}: {}",
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address resolved".to_string())
        )))
    }

    /// Send one request and block for its reply, surfacing every failure.
    pub fn exchange(&mut self, request: &Envelope) -> Result<Envelope> {
        let bytes = self.codec.encode(request)?;
        self.connect()?;

        match self.round_trip(&bytes) {
            Ok(reply) if message::is_terminator(&reply) => {
                self.drop_connection();
                Err(NumassError::transport("session terminated by server"))
            }
            Ok(reply) => Ok(reply),
            Err(e) => {
                // Stream position is unknown after a failed read.
                self.drop_connection();
                Err(e)
            }
        }
    }

    /// Send one request and return its reply.
    ///
    /// Never fails: any error is folded into a `success=false` response
    /// answering `request`.
    pub fn respond(&mut self, request: &Envelope) -> Envelope {
        match self.exchange(request) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, ty = ?request.ty(), "error in envelope exchange");
                message::error_response_base(request, &e).build()
            }
        }
    }

    /// Announce the end of the session and close the socket. Idempotent.
    pub fn close(&mut self) {
        if let Connection::Connected(mut stream) =
            std::mem::replace(&mut self.conn, Connection::Closed)
        {
            if let Err(e) = self.codec.write(&mut stream, &message::terminator()) {
                tracing::debug!(error = %e, "terminator not delivered");
            }
            let _ = stream.shutdown(Shutdown::Both);
            tracing::info!("connection closed");
        }
        self.conn = Connection::Closed;
        self.buf.clear();
    }

    fn round_trip(&mut self, request: &[u8]) -> Result<Envelope> {
        let stream = match &mut self.conn {
            Connection::Connected(s) => s,
            _ => return Err(NumassError::transport("not connected")),
        };
        stream.write_all(request)?;
        stream.flush()?;
        tracing::debug!(len = request.len(), "request sent");

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.codec.try_decode(&mut self.buf)? {
                tracing::debug!(ty = ?frame.envelope.ty(), "reply received");
                return Ok(frame.envelope);
            }

            match stream.read(&mut chunk) {
                Ok(0) if self.buf.is_empty() => {
                    return Err(NumassError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )));
                }
                Ok(0) => {
                    return Err(NumassError::IncompleteEnvelope {
                        needed: declared_total(&self.buf)?.unwrap_or(self.buf.len() + 1),
                        available: self.buf.len(),
                    });
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout(&e) => match self.config.read_policy {
                    ReadPolicy::Retry => {
                        tracing::trace!(buffered = self.buf.len(), "read timed out, retrying");
                    }
                    ReadPolicy::FailFast => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drop_connection(&mut self) {
        if let Connection::Connected(stream) =
            std::mem::replace(&mut self.conn, Connection::Disconnected)
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.buf.clear();
    }
}

impl Drop for NumassClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
