//! Per-thread connection pool
//!
//! A `Connection` must never be used from two threads at once. The pool
//! gives every calling thread a connection of its own: a few are opened up
//! front, and more are opened on demand once those are handed out.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::protocol::Reply;
use super::connection::Connection;
use super::endpoint::Endpoint;

/// Connections opened eagerly by `ConnectionPool::connect`
pub const DEFAULT_STANDBY_SIZE: usize = 8;

/// Shared handle to one thread's connection
pub type PooledConnection = Arc<Mutex<Connection>>;

/// Hands each thread its own connection to the same endpoint
pub struct ConnectionPool {
    endpoint: Endpoint,
    config: ConnectionConfig,

    /// Connected, not yet assigned to any thread
    standby: Mutex<Vec<Connection>>,

    /// Connections already assigned, by owning thread
    assigned: Mutex<HashMap<ThreadId, PooledConnection>>,
}

impl ConnectionPool {
    /// Open `standby_size` connections to `endpoint` up front
    pub fn connect(endpoint: Endpoint, config: ConnectionConfig, standby_size: usize) -> Result<Self> {
        let mut standby = Vec::with_capacity(standby_size);
        for _ in 0..standby_size {
            standby.push(open(&endpoint, &config)?);
        }

        tracing::debug!("Pool for {} opened {} standby connection(s)", endpoint, standby_size);

        Ok(Self {
            endpoint,
            config,
            standby: Mutex::new(standby),
            assigned: Mutex::new(HashMap::new()),
        })
    }

    /// Connection owned by the calling thread, assigned on first use
    pub fn client(&self) -> Result<PooledConnection> {
        let id = thread::current().id();
        if let Some(conn) = self.assigned.lock().get(&id) {
            return Ok(Arc::clone(conn));
        }

        let conn = match self.standby.lock().pop() {
            Some(conn) => conn,
            None => {
                tracing::debug!("Standby pool for {} exhausted, opening a connection", self.endpoint);
                open(&self.endpoint, &self.config)?
            }
        };

        let conn = Arc::new(Mutex::new(conn));
        self.assigned.lock().insert(id, Arc::clone(&conn));
        Ok(conn)
    }

    /// Stage a command on the calling thread's connection
    pub fn write<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<()> {
        self.client()?.lock().write(args)
    }

    /// Read the next reply on the calling thread's connection
    pub fn read(&self) -> Result<Reply> {
        self.client()?.lock().read()
    }

    /// Connections opened but not yet handed to a thread
    pub fn standby_len(&self) -> usize {
        self.standby.lock().len()
    }

    /// Connections currently assigned to threads
    pub fn assigned_len(&self) -> usize {
        self.assigned.lock().len()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

fn open(endpoint: &Endpoint, config: &ConnectionConfig) -> Result<Connection> {
    let mut conn = Connection::with_config(config.clone());
    conn.connect_endpoint(endpoint, None)?;
    Ok(conn)
}
