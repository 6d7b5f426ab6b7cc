pub mod selector;

pub use selector::{acquire, ConnectionSelector};

use crate::config::RepcacheConfig;
use crate::error::Result;
use crate::transport::CacheConnection;
use std::sync::Arc;

/// Ordered, immutable list of candidate cache servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPool {
    servers: Arc<[String]>,
}

impl ServerPool {
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated list, e.g. `"cache1:11211, cache2:11211"`.
    pub fn parse(raw: &str) -> Self {
        Self::new(crate::config::parse_server_list(raw))
    }

    pub fn from_config(config: &RepcacheConfig) -> Self {
        Self::new(config.servers.iter().cloned())
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Exclusive, single-pass link to the server chosen by the selector.
///
/// Dropping the handle disconnects, so a pass that returns early still
/// releases its connection.
pub struct ConnectionHandle<C: CacheConnection> {
    address: String,
    conn: C,
    released: bool,
}

impl<C: CacheConnection> ConnectionHandle<C> {
    pub(crate) fn new(address: String, conn: C) -> Self {
        Self {
            address,
            conn,
            released: false,
        }
    }

    /// Address of the pool entry this handle is bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.store(key, value)
    }

    pub fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn.fetch(key)
    }

    pub fn release(mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if !self.released {
            self.released = true;
            self.conn.disconnect();
            tracing::debug!("[RepcacheRetention] released connection to {}", self.address);
        }
    }
}

impl<C: CacheConnection> Drop for ConnectionHandle<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
