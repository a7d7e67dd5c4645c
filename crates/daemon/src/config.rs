// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node configuration: TOML file plus `FISH_<KEY>` environment
//! overrides (`spec.md` §6).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// Per-instance driver config, e.g. `drivers.providers.test/prod`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriverProviderConfig {
    #[serde(default)]
    pub cpu_limit: Option<u32>,
    #[serde(default)]
    pub ram_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriversConfig {
    #[serde(default)]
    pub providers: HashMap<String, DriverProviderConfig>,
    /// SSH proxy gate block. The SSH-proxy driver backend itself is out
    /// of scope (`spec.md` §1); this is carried through only so the key
    /// round-trips for operators migrating a config file.
    #[serde(default)]
    pub gates: toml::value::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node_location: String,
    #[serde(default = "default_api_address")]
    pub api_address: String,
    #[serde(default)]
    pub proxy_ssh_address: Option<String>,
    /// Seconds; 0 = no expiry (`spec.md` §4.5).
    #[serde(default)]
    pub default_resource_lifetime: u64,
    #[serde(default = "default_cleanup_interval")]
    pub db_cleanup_interval: u64,
    #[serde(default = "default_compact_interval")]
    pub db_compact_interval: u64,
    #[serde(default)]
    pub node_debug_pprof: bool,
    #[serde(default)]
    pub drivers: DriversConfig,
}

fn default_api_address() -> String {
    "127.0.0.1:0".to_string()
}

fn default_cleanup_interval() -> u64 {
    5
}

fn default_compact_interval() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_location: String::new(),
            api_address: default_api_address(),
            proxy_ssh_address: None,
            default_resource_lifetime: 0,
            db_cleanup_interval: default_cleanup_interval(),
            db_compact_interval: default_compact_interval(),
            node_debug_pprof: false,
            drivers: DriversConfig::default(),
        }
    }
}

impl Config {
    pub fn default_resource_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_resource_lifetime)
    }

    pub fn db_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.db_cleanup_interval)
    }

    pub fn db_compact_interval(&self) -> Duration {
        Duration::from_secs(self.db_compact_interval)
    }

    /// Load from a TOML file, then apply `FISH_<KEY_UPPER>` environment
    /// overrides for the handful of scalar top-level keys (`spec.md` §6
    /// expansion — an ambient convenience, not a spec feature).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DaemonError> {
        let mut config = if path.as_ref().exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text).map_err(|e| DaemonError::Config(e.to_string()))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FISH_NODE_LOCATION") {
            self.node_location = v;
        }
        if let Ok(v) = std::env::var("FISH_API_ADDRESS") {
            self.api_address = v;
        }
        if let Ok(v) = std::env::var("FISH_PROXY_SSH_ADDRESS") {
            self.proxy_ssh_address = Some(v);
        }
        if let Some(v) = parse_env_u64("FISH_DEFAULT_RESOURCE_LIFETIME") {
            self.default_resource_lifetime = v;
        }
        if let Some(v) = parse_env_u64("FISH_DB_CLEANUP_INTERVAL") {
            self.db_cleanup_interval = v;
        }
        if let Some(v) = parse_env_u64("FISH_DB_COMPACT_INTERVAL") {
            self.db_compact_interval = v;
        }
        if let Ok(v) = std::env::var("FISH_NODE_DEBUG_PPROF") {
            self.node_debug_pprof = v == "1" || v.eq_ignore_ascii_case("true");
        }
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
