//! Endpoint
//!
//! Where a connection goes: `host:port` over TCP, or a unix socket path.

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::RespError;

/// Default server port
pub const DEFAULT_PORT: u16 = 6379;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },

    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }
}

/// Parses `host:port`, a bare `host` (default port), `[v6]:port`, or a path
/// containing `/` for unix sockets.
impl FromStr for Endpoint {
    type Err = RespError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RespError::InvalidEndpoint("empty address".to_string()));
        }

        #[cfg(unix)]
        if s.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') || host.ends_with(']') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| RespError::InvalidEndpoint(format!("bad port in {:?}", s)))?;
                (host, port)
            }
            _ => (s, DEFAULT_PORT),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(RespError::InvalidEndpoint(format!("missing host in {:?}", s)));
        }

        Ok(Endpoint::tcp(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}
