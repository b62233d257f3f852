//! Connection
//!
//! Owns one socket plus the decoder fed from it.
//!
//! ## State machine
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └────────failed──────────┘                  │
//!      └───────disconnect / reset / protocol fault─┘
//! ```
//!
//! ## Timeouts
//! `read` and `flush` each take one deadline at entry. Partial writes,
//! spurious wake-ups and interrupted calls all draw from the same budget, and
//! the matching timeout error fires once it is spent.

use std::io::{Read, Write};
use std::net::Shutdown;
#[cfg(unix)]
use std::os::unix::io::RawFd;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::config::ConnectionConfig;
use crate::error::{RespError, Result};
use crate::protocol::{encode_command_into, Command, Decoder, Reply};
use super::deadline::{Budget, Deadline};
use super::endpoint::Endpoint;
use super::transport::{self, is_connection_lost, is_would_block, Transport};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A client connection: command framing out, reply decoding in
pub struct Connection {
    /// Socket, present only while connected
    transport: Option<Box<dyn Transport>>,

    /// Reply decoder fed from the socket
    decoder: Decoder,

    /// Framed commands not yet handed to the kernel
    outbound: BytesMut,

    /// Scratch space for one socket read
    scratch: Vec<u8>,

    /// Send/receive budget; `None` blocks indefinitely
    timeout: Option<Duration>,

    config: ConnectionConfig,

    state: ConnectionState,

    /// Peer description for logging
    peer: String,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Create a disconnected connection with default configuration
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    /// Create a disconnected connection
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            transport: None,
            decoder: Decoder::new(),
            outbound: BytesMut::new(),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
            timeout: config.timeout,
            config,
            state: ConnectionState::Disconnected,
            peer: String::new(),
        }
    }

    /// Wrap an already-connected transport
    pub fn from_transport(transport: Box<dyn Transport>, config: ConnectionConfig) -> Self {
        let mut conn = Self::with_config(config);
        conn.attach(transport, "custom transport".to_string());
        conn
    }

    // -------------------------------------------------------------------------
    // Connecting
    // -------------------------------------------------------------------------

    /// Connect over TCP.
    ///
    /// `timeout` overrides the configured connect timeout for this attempt.
    /// A failed attempt leaves the connection disconnected and retryable.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Option<Duration>) -> Result<()> {
        let timeout = self.begin_connect(timeout)?;
        let peer = Endpoint::tcp(host, port).to_string();

        match transport::connect_tcp(host, port, timeout, self.config.tcp_nodelay) {
            Ok(stream) => {
                self.attach(Box::new(stream), peer);
                Ok(())
            }
            Err(e) => self.abort_connect(&peer, e),
        }
    }

    /// Connect to a unix domain socket
    #[cfg(unix)]
    pub fn connect_unix(&mut self, path: impl AsRef<Path>, timeout: Option<Duration>) -> Result<()> {
        let path = path.as_ref();
        let timeout = self.begin_connect(timeout)?;
        let peer = path.display().to_string();

        match transport::connect_unix(path, timeout) {
            Ok(stream) => {
                self.attach(Box::new(stream), peer);
                Ok(())
            }
            Err(e) => self.abort_connect(&peer, e),
        }
    }

    /// Connect to either kind of endpoint
    pub fn connect_endpoint(&mut self, endpoint: &Endpoint, timeout: Option<Duration>) -> Result<()> {
        match endpoint {
            Endpoint::Tcp { host, port } => self.connect(host, *port, timeout),
            #[cfg(unix)]
            Endpoint::Unix(path) => self.connect_unix(path, timeout),
        }
    }

    fn begin_connect(&mut self, timeout: Option<Duration>) -> Result<Option<Duration>> {
        if timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(RespError::InvalidTimeout("timeout should be positive".to_string()));
        }

        self.disconnect();
        self.state = ConnectionState::Connecting;
        Ok(timeout.or(self.config.effective_connect_timeout()))
    }

    fn abort_connect(&mut self, peer: &str, err: RespError) -> Result<()> {
        tracing::debug!("Connection to {} failed: {}", peer, err);
        self.state = ConnectionState::Disconnected;
        Err(err)
    }

    fn attach(&mut self, transport: Box<dyn Transport>, peer: String) {
        tracing::debug!("Connected to {}", peer);
        self.transport = Some(transport);
        self.peer = peer;
        self.state = ConnectionState::Connected;
    }

    /// Close the socket and drop buffered bytes and partial replies.
    ///
    /// Safe to call in any state.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            // Wakes up clones blocked in another thread
            let _ = transport.shutdown(Shutdown::Both);
            tracing::debug!("Disconnected from {}", self.peer);
        }
        self.decoder.reset();
        self.outbound.clear();
        self.state = ConnectionState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Set the send/receive timeout in microseconds; `0` disables it
    pub fn set_timeout(&mut self, usecs: i64) -> Result<()> {
        self.ensure_connected()?;
        if usecs < 0 {
            return Err(RespError::InvalidTimeout(format!(
                "timeout should be non-negative, got {}",
                usecs
            )));
        }

        self.timeout = match usecs {
            0 => None,
            usecs => Some(Duration::from_micros(usecs as u64)),
        };
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Descriptor for external readiness polling
    #[cfg(unix)]
    pub fn file_descriptor(&self) -> Result<RawFd> {
        self.transport
            .as_ref()
            .map(|transport| transport.raw_fd())
            .ok_or(RespError::NotConnected)
    }

    /// Handle that can shut the socket down from another thread
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let transport = self.transport.as_ref().ok_or(RespError::NotConnected)?;
        Ok(ShutdownHandle {
            transport: transport.try_clone_transport()?,
        })
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    /// Frame `args` as one request and stage it.
    ///
    /// Nothing reaches the socket until `flush` or `read`.
    pub fn write<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<()> {
        self.ensure_connected()?;
        encode_command_into(args, &mut self.outbound);
        tracing::trace!("Staged {} argument(s) for {}", args.len(), self.peer);
        Ok(())
    }

    /// Stage a built command
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        self.write(command.args())
    }

    /// Bytes staged but not yet handed to the kernel
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// Push every staged byte into the kernel send buffer.
    ///
    /// Fails with `SendTimeout` once the whole call has waited longer than
    /// the timeout; bytes not yet written stay staged.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_until(&Deadline::after(self.timeout))
    }

    fn flush_until(&mut self, deadline: &Deadline) -> Result<()> {
        self.ensure_connected()?;

        while !self.outbound.is_empty() {
            let wait = match deadline.remaining() {
                Budget::Unbounded => None,
                Budget::Remaining(left) => Some(left),
                Budget::Expired => {
                    tracing::debug!(
                        "Send to {} timed out with {} bytes pending",
                        self.peer,
                        self.outbound.len()
                    );
                    return Err(RespError::SendTimeout);
                }
            };

            let transport = self.transport.as_mut().ok_or(RespError::NotConnected)?;
            transport.set_write_timeout(wait)?;

            match transport.write(&self.outbound) {
                Ok(0) => return self.fail(RespError::ConnectionReset),
                Ok(n) => {
                    tracing::trace!("Wrote {} bytes to {}", n, self.peer);
                    self.outbound.advance(n);
                }
                Err(e) if is_would_block(&e) => continue,
                Err(e) if is_connection_lost(&e) => return self.fail(RespError::ConnectionReset),
                Err(e) => return self.fail(RespError::Io(e)),
            }
        }

        if let Some(transport) = self.transport.as_mut() {
            transport.flush()?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reading
    // -------------------------------------------------------------------------

    /// Read the next reply.
    ///
    /// Staged commands are flushed first, within the same timeout as the
    /// wait for the reply. A top-level error reply comes back as
    /// `RespError::ErrorReply`; nested error replies stay inside their array.
    pub fn read(&mut self) -> Result<Reply> {
        let deadline = Deadline::after(self.timeout);
        self.flush_until(&deadline)?;

        loop {
            match self.decoder.gets() {
                Ok(Some(reply)) => return reply.into_result(),
                Ok(None) => {}
                Err(e) => return self.fail(e),
            }

            let wait = match deadline.remaining() {
                Budget::Unbounded => None,
                Budget::Remaining(left) => Some(left),
                Budget::Expired => {
                    tracing::debug!("Read from {} timed out", self.peer);
                    return Err(RespError::ReceiveTimeout);
                }
            };

            let transport = self.transport.as_mut().ok_or(RespError::NotConnected)?;
            transport.set_read_timeout(wait)?;

            match transport.read(&mut self.scratch) {
                Ok(0) => {
                    tracing::debug!("{} closed the connection", self.peer);
                    return self.fail(RespError::ConnectionReset);
                }
                Ok(n) => {
                    tracing::trace!("Read {} bytes from {}", n, self.peer);
                    self.decoder.feed(&self.scratch[..n]);
                }
                Err(e) if is_would_block(&e) => continue,
                Err(e) if is_connection_lost(&e) => return self.fail(RespError::ConnectionReset),
                Err(e) => return self.fail(RespError::Io(e)),
            }
        }
    }

    /// Reply decoder, for inspecting buffered state
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_some() {
            Ok(())
        } else {
            Err(RespError::NotConnected)
        }
    }

    /// Tear the connection down and report `err`
    fn fail<T>(&mut self, err: RespError) -> Result<T> {
        tracing::debug!("Dropping connection to {}: {}", self.peer, err);
        self.disconnect();
        Err(err)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Shuts a connection's socket down from another thread.
///
/// A `read` or `flush` blocked on the socket then fails with
/// `ConnectionReset` instead of waiting out its timeout.
pub struct ShutdownHandle {
    transport: Box<dyn Transport>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> Result<()> {
        match self.transport.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
