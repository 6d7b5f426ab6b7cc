use super::{CacheConnection, Connector};
use crate::error::{RepcacheError, Result};
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    /// address -> key -> value
    servers: DashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
    unreachable: DashSet<String>,
    failing_stores: DashSet<Vec<u8>>,
    failing_fetches: DashSet<Vec<u8>>,
    probes: Mutex<Vec<String>>,
    open_connections: AtomicUsize,
    store_calls: AtomicUsize,
}

/// In-process cache pool. Every address gets its own key space, so failover
/// behaves like it would against separate servers.
///
/// Clones share state, which lets a test keep a handle for inspection while the
/// synchronizer owns another.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    inner: Arc<Inner>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, address: &str) {
        self.inner.unreachable.insert(address.to_string());
    }

    pub fn set_reachable(&self, address: &str) {
        self.inner.unreachable.remove(address);
    }

    /// Make every store of `key` fail, on any server.
    pub fn fail_store_for(&self, key: &[u8]) {
        self.inner.failing_stores.insert(key.to_vec());
    }

    /// Make every fetch of `key` fail, on any server.
    pub fn fail_fetch_for(&self, key: &[u8]) {
        self.inner.failing_fetches.insert(key.to_vec());
    }

    pub fn insert_raw(&self, address: &str, key: &[u8], value: &[u8]) {
        self.inner
            .servers
            .entry(address.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn get_raw(&self, address: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.inner
            .servers
            .get(address)
            .and_then(|server| server.get(key).cloned())
    }

    /// Full contents of one server, ordered by key.
    pub fn snapshot(&self, address: &str) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner
            .servers
            .get(address)
            .map(|server| server.value().clone())
            .unwrap_or_default()
    }

    /// Every address probed so far, in probe order.
    pub fn probes(&self) -> Vec<String> {
        self.inner
            .probes
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    pub fn store_calls(&self) -> usize {
        self.inner.store_calls.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(&self, address: &str) -> Result<MemoryConnection> {
        if let Ok(mut probes) = self.inner.probes.lock() {
            probes.push(address.to_string());
        }

        if self.inner.unreachable.contains(address) {
            return Err(RepcacheError::Connect {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            address: address.to_string(),
            inner: Arc::clone(&self.inner),
            connected: true,
        })
    }
}

pub struct MemoryConnection {
    address: String,
    inner: Arc<Inner>,
    connected: bool,
}

impl MemoryConnection {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(RepcacheError::Protocol(format!(
                "connection to {} already closed",
                self.address
            )))
        }
    }
}

impl CacheConnection for MemoryConnection {
    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        self.inner.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.failing_stores.contains(key) {
            return Err(RepcacheError::NotStored(
                String::from_utf8_lossy(key).into_owned(),
            ));
        }
        self.inner
            .servers
            .entry(self.address.clone())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        if self.inner.failing_fetches.contains(key) {
            return Err(RepcacheError::Io(format!(
                "read from {} timed out",
                self.address
            )));
        }
        Ok(self
            .inner
            .servers
            .get(&self.address)
            .and_then(|server| server.get(key).cloned()))
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.inner.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_fetch_per_server() {
        let cache = MemoryConnector::new();
        let mut a = cache.connect("a:11211").unwrap();
        a.store(b"HOST-web1", b"{}").unwrap();

        assert_eq!(a.fetch(b"HOST-web1").unwrap(), Some(b"{}".to_vec()));

        let mut b = cache.connect("b:11211").unwrap();
        assert_eq!(b.fetch(b"HOST-web1").unwrap(), None);
    }

    #[test]
    fn test_unreachable_address_is_recorded_in_probes() {
        let cache = MemoryConnector::new();
        cache.set_unreachable("a:11211");

        assert!(cache.connect("a:11211").is_err());
        assert!(cache.connect("b:11211").is_ok());
        assert_eq!(cache.probes(), vec!["a:11211", "b:11211"]);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let cache = MemoryConnector::new();
        let mut conn = cache.connect("a:11211").unwrap();
        assert_eq!(cache.open_connections(), 1);

        conn.disconnect();
        conn.disconnect();
        assert_eq!(cache.open_connections(), 0);
        assert!(conn.fetch(b"HOST-web1").is_err());
    }

    #[test]
    fn test_injected_failures() {
        let cache = MemoryConnector::new();
        cache.fail_store_for(b"HOST-bad");
        cache.fail_fetch_for(b"HOST-slow");

        let mut conn = cache.connect("a:11211").unwrap();
        assert!(conn.store(b"HOST-bad", b"1").is_err());
        assert!(conn.store(b"HOST-slow", b"1").is_ok());
        assert!(conn.fetch(b"HOST-slow").is_err());
        assert_eq!(cache.store_calls(), 2);
        assert!(cache.get_raw("a:11211", b"HOST-bad").is_none());
    }
}
