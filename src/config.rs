//! Process configuration. Process lifecycle, CLI flags, and config-file loading are themselves
//! external collaborators, but the shape the embedding process loads from TOML/YAML belongs in
//! the library so a host binary has something concrete to deserialize into -- the same way
//! `near-network::config` feeds `NetworkState` with a plain `serde::Deserialize` struct rather
//! than parsing flags itself.

use crate::map::graph::MapScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for one SPN core process. A process may run several [`MapConfig`]s
/// (e.g. a local map and a public map) sharing one [`Store`](crate::store::Store) and
/// measurements registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the embedded `sled` store opens under.
    pub store_path: PathBuf,
    /// `true` enables the measurement driver's periodic pass (public nodes only).
    #[serde(default)]
    pub measurements_enabled: bool,
    #[serde(default)]
    pub maps: Vec<MapConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub name: String,
    pub scope: ScopeConfig,
    /// Hub ID of this node's home hub, once bootstrapped. Absent until the first successful
    /// bootstrap suggestion (optimizer purpose `bootstrap`) is dialed by the transport layer.
    #[serde(default)]
    pub home_hub: Option<String>,
    /// Initial bootstrap transports, before any Intel bundle is loaded.
    #[serde(default)]
    pub bootstrap_transports: Vec<String>,
    /// Path to the Intel bundle YAML document.
    pub intel_path: Option<PathBuf>,
}

/// Wire-friendly mirror of [`MapScope`], since that type lives in `map` and doesn't need a
/// `serde` dependency outside this config boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeConfig {
    Local,
    Public,
}

impl From<ScopeConfig> for MapScope {
    fn from(value: ScopeConfig) -> Self {
        match value {
            ScopeConfig::Local => MapScope::Local,
            ScopeConfig::Public => MapScope::Public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_map_config() {
        let yaml = "name: home\nscope: public\nintel_path: null\n";
        let cfg: MapConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.name, "home");
        assert_eq!(cfg.scope, ScopeConfig::Public);
        assert!(cfg.bootstrap_transports.is_empty());
    }

    #[test]
    fn scope_config_maps_to_map_scope() {
        assert_eq!(MapScope::from(ScopeConfig::Local), MapScope::Local);
        assert_eq!(MapScope::from(ScopeConfig::Public), MapScope::Public);
    }
}
