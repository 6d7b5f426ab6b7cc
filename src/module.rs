//! Scheduler-facing retention module: registration data, instance factory and
//! the `init` / save / load hooks.

use crate::codec::{JsonCodec, RetentionCodec};
use crate::config::RepcacheConfig;
use crate::error::{RepcacheError, Result};
use crate::pool::{ConnectionSelector, ServerPool};
use crate::retention::{LoadStats, RetentionDaemon, RetentionSynchronizer, SaveReport};
use crate::transport::{Connector, MemcacheConnector};
use serde::{Deserialize, Serialize};

/// Registration data the plugin loader matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleProperties {
    pub daemons: &'static [&'static str],
    pub module_type: &'static str,
    pub external: bool,
}

pub const MODULE_PROPERTIES: ModuleProperties = ModuleProperties {
    daemons: &["scheduler"],
    module_type: "repcache_retention",
    external: false,
};

/// Module definition as handed over by the plugin loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConf {
    pub module_name: String,
    #[serde(default = "default_module_type")]
    pub module_type: String,
    /// Comma-separated server list, highest priority first.
    pub servers: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_item_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value_bytes: Option<usize>,
}

fn default_module_type() -> String {
    MODULE_PROPERTIES.module_type.to_string()
}

impl ModuleConf {
    pub fn new(module_name: impl Into<String>, servers: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            module_type: default_module_type(),
            servers: servers.into(),
            continue_on_item_error: None,
            connect_timeout_ms: None,
            io_timeout_ms: None,
            expire_secs: None,
            max_value_bytes: None,
        }
    }

    /// Defaults for everything the definition leaves unset.
    pub fn to_config(&self) -> RepcacheConfig {
        let mut config = RepcacheConfig::from_server_list(&self.servers);
        if let Some(v) = self.continue_on_item_error {
            config.continue_on_item_error = v;
        }
        if let Some(v) = self.connect_timeout_ms {
            config.connect_timeout_ms = v;
        }
        if let Some(v) = self.io_timeout_ms {
            config.io_timeout_ms = v;
        }
        if let Some(v) = self.expire_secs {
            config.expire_secs = v;
        }
        if let Some(v) = self.max_value_bytes {
            config.max_value_bytes = v;
        }
        config
    }
}

/// Default module instance: memcached transport with JSON retention objects.
pub type DefaultRepcacheRetention =
    RepcacheRetention<MemcacheConnector, JsonCodec<serde_json::Value>>;

/// Build the default module for a loader-provided definition.
pub fn get_instance(mod_conf: &ModuleConf) -> Result<DefaultRepcacheRetention> {
    tracing::debug!(
        "Get a repcache retention scheduler module for plugin {}",
        mod_conf.module_name
    );
    if mod_conf.module_type != MODULE_PROPERTIES.module_type {
        return Err(RepcacheError::Config(format!(
            "module {} has type {}, expected {}",
            mod_conf.module_name, mod_conf.module_type, MODULE_PROPERTIES.module_type
        )));
    }
    let config = mod_conf.to_config();
    let connector = MemcacheConnector::from_config(&config);
    RepcacheRetention::from_config(&mod_conf.module_name, &config, connector, JsonCodec::new())
}

pub struct RepcacheRetention<K, C> {
    name: String,
    synchronizer: RetentionSynchronizer<K, C>,
}

impl<K: Connector, C: RetentionCodec> RepcacheRetention<K, C> {
    pub fn from_config(
        name: &str,
        config: &RepcacheConfig,
        connector: K,
        codec: C,
    ) -> Result<Self> {
        config.validate()?;
        let selector = ConnectionSelector::new(connector, ServerPool::from_config(config));
        let synchronizer = RetentionSynchronizer::new(selector, codec)
            .with_continue_on_item_error(config.continue_on_item_error);
        Ok(Self {
            name: name.to_string(),
            synchronizer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &ServerPool {
        self.synchronizer.selector().pool()
    }

    pub fn synchronizer(&self) -> &RetentionSynchronizer<K, C> {
        &self.synchronizer
    }

    /// Readiness signal from the scheduler. Nothing to prepare: connections
    /// are opened per pass.
    pub fn init(&self) {
        tracing::debug!(
            "[RepcacheRetention] Initialization of the repcache module {} ({} servers)",
            self.name,
            self.pool().len()
        );
    }

    /// Save the daemon's current retention data.
    pub fn save_retention<D>(&self, daemon: &D) -> Result<SaveReport>
    where
        D: RetentionDaemon<Object = C::Object>,
    {
        tracing::debug!("[RepcacheRetention] asking me to update the retention objects");
        let data = daemon.get_retention_data();
        let report = self.synchronizer.save(&data)?;
        tracing::info!("[RepcacheRetention] Retention information updated in Memcache");
        Ok(report)
    }

    /// Load retention data for the objects the daemon tracks and hand it back.
    ///
    /// On failure the daemon is left untouched.
    pub fn load_retention<D>(&self, daemon: &mut D) -> Result<LoadStats>
    where
        D: RetentionDaemon<Object = C::Object>,
    {
        tracing::debug!("[RepcacheRetention] asking me to load the retention objects");
        let ids = daemon.identities();
        let (data, stats) = self
            .synchronizer
            .load(&ids.hosts, &ids.services)?
            .into_parts();

        daemon.restore_retention_data(data);
        tracing::info!("[RepcacheRetention] Retention objects loaded successfully.");
        Ok(stats)
    }

    /// Scheduler hook; `false` only when the pass itself failed.
    pub fn hook_save_retention<D>(&self, daemon: &D) -> bool
    where
        D: RetentionDaemon<Object = C::Object>,
    {
        self.save_retention(daemon).is_ok()
    }

    /// Scheduler hook; `true` when the pass completed, even if some objects
    /// were skipped.
    pub fn hook_load_retention<D>(&self, daemon: &mut D) -> bool
    where
        D: RetentionDaemon<Object = C::Object>,
    {
        self.load_retention(daemon).is_ok()
    }
}
