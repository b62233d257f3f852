//! Transports
//!
//! A `Connection` talks to its peer through a boxed `Transport`, chosen when
//! the connection is built. TCP and unix domain sockets are provided; tests
//! and embedders can plug in anything else that behaves like a blocking
//! stream with per-call timeouts.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{RespError, Result};

/// Byte stream a `Connection` reads replies from and writes commands to
pub trait Transport: Read + Write + Send {
    /// Bound the next reads; `None` blocks indefinitely
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Bound the next writes; `None` blocks indefinitely
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn shutdown(&self, how: Shutdown) -> io::Result<()>;

    /// Second handle to the same underlying socket
    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>>;

    /// Descriptor for external readiness polling
    #[cfg(unix)]
    fn raw_fd(&self) -> RawFd;
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.try_clone()?))
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }
}

#[cfg(unix)]
impl Transport for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        UnixStream::shutdown(self, how)
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }
}

// =============================================================================
// Connecting
// =============================================================================

/// Resolve `host` and connect to the first address that accepts.
///
/// Resolution failure, refusal and timeout are reported as distinct errors.
pub(crate) fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
    nodelay: bool,
) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| RespError::NameResolution {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    let mut last_err = RespError::NameResolution {
        host: host.to_string(),
        reason: "no addresses found".to_string(),
    };

    for addr in addrs {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        match connect_socket(&socket, &SockAddr::from(addr), timeout) {
            Ok(()) => {
                let stream = TcpStream::from(socket);
                if nodelay {
                    stream.set_nodelay(true)?;
                }
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Connect to {} failed: {}", addr, e);
                last_err = classify_connect_error(e, &addr.to_string());
            }
        }
    }

    Err(last_err)
}

/// Connect to a unix domain socket
#[cfg(unix)]
pub(crate) fn connect_unix(path: &Path, timeout: Option<Duration>) -> Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let addr = SockAddr::unix(path)?;

    match connect_socket(&socket, &addr, timeout) {
        Ok(()) => Ok(UnixStream::from(OwnedFd::from(socket))),
        Err(e) => Err(classify_connect_error(e, &path.display().to_string())),
    }
}

fn connect_socket(socket: &Socket, addr: &SockAddr, timeout: Option<Duration>) -> io::Result<()> {
    match timeout {
        Some(timeout) => socket.connect_timeout(addr, timeout),
        None => socket.connect(addr),
    }
}

fn classify_connect_error(err: io::Error, target: &str) -> RespError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => RespError::ConnectionRefused(target.to_string()),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            RespError::ConnectTimeout(target.to_string())
        }
        _ => RespError::Io(err),
    }
}

// =============================================================================
// Error classification
// =============================================================================

/// The socket timeout fired; the caller re-checks its own deadline
pub(crate) fn is_would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// The peer is gone
pub(crate) fn is_connection_lost(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
