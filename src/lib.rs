//! # Repcache
//!
//! Scheduler retention persistence on memcached-compatible servers. A save
//! pass writes every host and service's retained state under its own key; a
//! load pass fetches state back for the objects the scheduler currently
//! tracks. Servers are tried in configured order and the first reachable one
//! serves the whole pass.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use repcache::{JsonCodec, MemcacheConnector, RepcacheConfig, RepcacheRetention};
//! use repcache::types::{RetentionData, ServiceId};
//! use serde_json::json;
//!
//! # fn main() -> repcache::Result<()> {
//! let config = RepcacheConfig::from_server_list("cache1:11211, cache2:11211");
//! let module = RepcacheRetention::from_config(
//!     "repcache",
//!     &config,
//!     MemcacheConnector::from_config(&config),
//!     JsonCodec::<serde_json::Value>::new(),
//! )?;
//!
//! let data = RetentionData::new()
//!     .with_host("web1", json!({"state": "UP"}))
//!     .with_service(("web1", "HTTP"), json!({"state": "OK"}));
//! let report = module.synchronizer().save(&data)?;
//! println!("stored {} objects on {}", report.stored, report.pass.server);
//!
//! let loaded = module
//!     .synchronizer()
//!     .load(&["web1".to_string()], &[ServiceId::new("web1", "HTTP")])?;
//! assert_eq!(loaded.data.hosts.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Dependencies | Use case |
//! |---------|-------------|----------|
//! | `compression` | flate2 | [`codec::GzipCodec`] for large retention objects |

pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod module;
pub mod pool;
pub mod retention;
pub mod transport;
pub mod types;

pub use codec::{JsonCodec, RetentionCodec};
pub use config::RepcacheConfig;
pub use error::{ItemFailureKind, RepcacheError, Result};
pub use key::{normalize_key, RetentionKey};
pub use module::{get_instance, ModuleConf, RepcacheRetention, MODULE_PROPERTIES};
pub use pool::{acquire, ConnectionHandle, ConnectionSelector, ServerPool};
pub use retention::{
    ItemFailure, LoadReport, LoadStats, PassReport, RetentionDaemon, RetentionSynchronizer,
    SaveReport,
};
pub use transport::{CacheConnection, Connector, MemcacheConnector, MemoryConnector};
pub use types::{RetentionData, RetentionIdentities, ServiceId};

#[cfg(feature = "compression")]
pub use codec::GzipCodec;
