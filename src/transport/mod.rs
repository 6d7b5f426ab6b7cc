//! Cache transport seam.
//!
//! The synchronizer only needs four primitives from a cache backend: a connect
//! probe, store, fetch and disconnect. [`memcache`] implements them over the
//! memcached text protocol; [`memory`] keeps everything in process for tests
//! and embedding.

pub mod memcache;
pub mod memory;

use crate::error::Result;

pub use memcache::{MemcacheConnection, MemcacheConnector, ServerAddress};
pub use memory::{MemoryConnection, MemoryConnector};

/// A live link to one cache server.
pub trait CacheConnection {
    /// Overwrite `key` with `value`.
    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// `Ok(None)` when the server has no entry for `key`.
    fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Close the link. Must be safe to call more than once.
    fn disconnect(&mut self);
}

/// Opens connections to pool addresses. `connect` doubles as the reachability probe.
pub trait Connector {
    type Connection: CacheConnection;

    fn connect(&self, address: &str) -> Result<Self::Connection>;
}
