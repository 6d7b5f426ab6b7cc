use super::{ConnectionHandle, ServerPool};
use crate::error::{RepcacheError, Result};
use crate::transport::Connector;

/// Probe the pool in order and return a handle on the first server that accepts.
///
/// Stops at the first success. Every address tried gets one log line; when
/// none answers the result is [`RepcacheError::PoolExhausted`].
pub fn acquire<K: Connector>(
    connector: &K,
    pool: &ServerPool,
) -> Result<ConnectionHandle<K::Connection>> {
    tracing::info!("[RepcacheRetention] Finding available repcache server");

    let mut tried = Vec::with_capacity(pool.len());
    for server in pool.servers() {
        match connector.connect(server) {
            Ok(conn) => {
                tracing::info!("[RepcacheRetention] Found server: {}", server);
                return Ok(ConnectionHandle::new(server.clone(), conn));
            }
            Err(e) => {
                tracing::warn!("[RepcacheRetention] server {} is unavailable: {}", server, e);
                tried.push(server.clone());
            }
        }
    }

    tracing::error!("[RepcacheRetention] No repcache available");
    Err(RepcacheError::PoolExhausted { tried })
}

/// A connector bound to its pool; each `acquire` is an independent scan.
#[derive(Debug, Clone)]
pub struct ConnectionSelector<K> {
    connector: K,
    pool: ServerPool,
}

impl<K: Connector> ConnectionSelector<K> {
    pub fn new(connector: K, pool: ServerPool) -> Self {
        Self { connector, pool }
    }

    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    pub fn acquire(&self) -> Result<ConnectionHandle<K::Connection>> {
        acquire(&self.connector, &self.pool)
    }
}
