//! # respwire
//!
//! Client-side plumbing for Redis-style servers:
//! - Incremental reply decoder that never needs a whole message at once
//! - Command framing as arrays of bulk strings
//! - Socket connection with end-to-end send/receive deadlines
//! - Per-thread connection pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Caller                              │
//! └──────────────┬──────────────────────────────▲───────────────┘
//!          write(args)                       read() -> Reply
//!                │                              │
//! ┌──────────────▼──────────────────────────────┴───────────────┐
//! │                       Connection                            │
//! │         (deadline-bounded flush / fill loops)               │
//! └──────┬───────────────────────▲──────────────────────────────┘
//!        │                       │
//!        ▼                       │
//!   ┌──────────┐          ┌──────┴──────┐      ┌─────────────┐
//!   │ Command  │          │   Decoder   │◀─────│   Buffer    │
//!   │ framing  │          │ (task stack)│      │ (cursor +   │
//!   └────┬─────┘          └─────────────┘      │ compaction) │
//!        │                                     └──────▲──────┘
//!        ▼                                            │
//!   ┌─────────────────────────────────────────────────┴──────────┐
//!   │                 Transport (TCP / unix)                     │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use respwire::{Connection, Reply};
//!
//! let mut conn = Connection::new();
//! conn.connect("127.0.0.1", 6379, None)?;
//! conn.set_timeout(250_000)?;
//! conn.write(&["SET", "greeting", "hello"])?;
//! assert_eq!(conn.read()?, Reply::Status("OK".into()));
//! # Ok::<(), respwire::RespError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RespError, Result};
pub use config::ConnectionConfig;
pub use protocol::{Command, Decoder, Reply};
pub use network::{Connection, ConnectionPool, Endpoint, Transport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of respwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
