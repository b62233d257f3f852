//! Network Module
//!
//! Client side of the socket: connecting, deadline-bounded reads and
//! writes, and a per-thread pool.
//!
//! ## Architecture
//! - One `Connection` per socket, used by one thread at a time
//! - The socket sits behind the `Transport` trait (TCP, unix, or custom)
//! - No background threads; callers drive `read`/`flush` or poll the
//!   descriptor themselves

mod connection;
mod deadline;
mod endpoint;
mod pool;
mod transport;

pub use connection::{Connection, ConnectionState, ShutdownHandle};
pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use pool::{ConnectionPool, PooledConnection, DEFAULT_STANDBY_SIZE};
pub use transport::Transport;
