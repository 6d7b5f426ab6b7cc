use crate::error::{RepcacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 3_000;
/// memcached's default item size limit (`-I 1m`).
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;
pub const CONFIG_FILE_NAME: &str = "repcache.json";

/// Settings for the retention module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepcacheConfig {
    /// Ordered server pool; the first entry is tried first.
    pub servers: Vec<String>,
    /// Skip items that fail to encode/store/fetch/decode instead of aborting the pass.
    pub continue_on_item_error: bool,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    /// Memcached expiration for stored entries; 0 never expires.
    pub expire_secs: u32,
    /// Largest value accepted in either direction.
    pub max_value_bytes: usize,
}

impl Default for RepcacheConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            continue_on_item_error: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            expire_secs: 0,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

/// Split a comma-separated server list, trimming each entry and dropping empty ones.
pub fn parse_server_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl RepcacheConfig {
    pub fn from_server_list(raw: &str) -> Self {
        Self {
            servers: parse_server_list(raw),
            ..Self::default()
        }
    }

    /// Load config from `REPCACHE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            servers: std::env::var("REPCACHE_SERVERS")
                .map(|v| parse_server_list(&v))
                .unwrap_or_default(),
            continue_on_item_error: std::env::var("REPCACHE_CONTINUE_ON_ITEM_ERROR")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.continue_on_item_error),
            connect_timeout_ms: std::env::var("REPCACHE_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.connect_timeout_ms),
            io_timeout_ms: std::env::var("REPCACHE_IO_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.io_timeout_ms),
            expire_secs: std::env::var("REPCACHE_EXPIRE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.expire_secs),
            max_value_bytes: std::env::var("REPCACHE_MAX_VALUE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_value_bytes),
        }
    }

    /// Load `{dir}/repcache.json`, falling back to the environment.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<RepcacheConfig>(&content) {
                    Ok(config) => {
                        tracing::info!(
                            "Loaded repcache config: servers={}, continue_on_item_error={}",
                            config.servers.len(),
                            config.continue_on_item_error
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse {}: {}, using env", CONFIG_FILE_NAME, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read {}: {}, using env", CONFIG_FILE_NAME, e);
                }
            }
        }

        Self::from_env()
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(RepcacheError::Config(
                "at least one repcache server is required".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(RepcacheError::Config(
                "connect_timeout_ms and io_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_value_bytes == 0 {
            return Err(RepcacheError::Config(
                "max_value_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
