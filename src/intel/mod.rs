//! Component B: Intel bundle.
//! Parsed bootstrap list, per-Hub overrides, regional topology config, and advisory endpoint
//! lists, loaded once from a YAML document. Grounded on the prior `store`-style separation
//! between "the columns we persist" and "the typed view callers get" -- here, `RawIntel`
//! (serde-deserialized shape matching the wire YAML) is compiled once into `Intel` (matchers
//! pre-parsed).

use crate::endpoint::EndpointList;
use crate::hub::HubId;
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Override {
    pub country: Option<String>,
    pub coords: Option<(f64, f64)>,
    pub asn: Option<u32>,
    pub as_org: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HubOverride {
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub discontinued: bool,
    #[serde(default)]
    pub verified_owner: Option<String>,
    #[serde(default)]
    pub r#override: Option<Override>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegionConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub member_policy: String,
    #[serde(default = "default_regional_min_lanes")]
    pub regional_min_lanes: u32,
    #[serde(default = "default_regional_max_lanes_on_hub")]
    pub regional_max_lanes_on_hub: u32,
    #[serde(default = "default_satellite_min_lanes")]
    pub satellite_min_lanes: u32,
    #[serde(default = "default_internal_min_lanes_on_hub")]
    pub internal_min_lanes_on_hub: u32,
    #[serde(default = "default_internal_max_hops")]
    pub internal_max_hops: u32,
}

fn default_regional_min_lanes() -> u32 {
    2
}
fn default_regional_max_lanes_on_hub() -> u32 {
    2
}
fn default_satellite_min_lanes() -> u32 {
    1
}
fn default_internal_min_lanes_on_hub() -> u32 {
    3
}
fn default_internal_max_hops() -> u32 {
    3
}

/// Floor enforced on `internal_max_hops`.
pub const INTERNAL_MAX_HOPS_FLOOR: u32 = 2;

impl RegionConfig {
    pub fn effective_internal_max_hops(&self) -> u32 {
        self.internal_max_hops.max(INTERNAL_MAX_HOPS_FLOOR)
    }
}

/// Wire shape of the Intel YAML document.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawIntel {
    #[serde(default)]
    pub bootstrap_hubs: Vec<String>,
    #[serde(default)]
    pub hubs: HashMap<String, HubOverride>,
    #[serde(default)]
    pub advise_only_trusted_home: bool,
    #[serde(default)]
    pub advise_only_trusted_destination: bool,
    #[serde(default)]
    pub global_advisory: String,
    #[serde(default)]
    pub home_advisory: String,
    #[serde(default)]
    pub destination_advisory: String,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub virtual_networks: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub manual_trust_nodes: Vec<String>,
}

/// Compiled, query-ready Intel bundle.
#[derive(Debug, Clone)]
pub struct Intel {
    pub bootstrap_hubs: Vec<String>,
    pub hubs: HashMap<HubId, HubOverride>,
    pub advise_only_trusted_home: bool,
    pub advise_only_trusted_destination: bool,
    pub global_advisory: EndpointList,
    pub home_advisory: EndpointList,
    pub destination_advisory: EndpointList,
    pub regions: Vec<RegionConfig>,
    pub virtual_networks: HashMap<String, Vec<HubId>>,
    pub manual_trust_nodes: Vec<HubId>,
}

#[derive(Debug, thiserror::Error)]
pub enum IntelError {
    #[error("failed to parse intel YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to compile advisory list: {0}")]
    Advisory(#[from] crate::endpoint::ParseError),
}

impl Intel {
    pub fn parse(yaml: &str) -> Result<Self, IntelError> {
        let raw: RawIntel = serde_yaml::from_str(yaml)?;
        Self::compile(raw)
    }

    pub fn compile(raw: RawIntel) -> Result<Self, IntelError> {
        Ok(Self {
            bootstrap_hubs: raw.bootstrap_hubs,
            hubs: raw.hubs.into_iter().map(|(k, v)| (HubId::from(k), v)).collect(),
            advise_only_trusted_home: raw.advise_only_trusted_home,
            advise_only_trusted_destination: raw.advise_only_trusted_destination,
            global_advisory: EndpointList::parse(&raw.global_advisory)?,
            home_advisory: EndpointList::parse(&raw.home_advisory)?,
            destination_advisory: EndpointList::parse(&raw.destination_advisory)?,
            regions: raw.regions,
            virtual_networks: raw
                .virtual_networks
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().map(HubId::from).collect()))
                .collect(),
            manual_trust_nodes: raw.manual_trust_nodes.into_iter().map(HubId::from).collect(),
        })
    }

    pub fn empty() -> Self {
        Self {
            bootstrap_hubs: vec![],
            hubs: HashMap::new(),
            advise_only_trusted_home: false,
            advise_only_trusted_destination: false,
            global_advisory: EndpointList::default(),
            home_advisory: EndpointList::default(),
            destination_advisory: EndpointList::default(),
            regions: vec![],
            virtual_networks: HashMap::new(),
            manual_trust_nodes: vec![],
        }
    }

    pub fn get_override(&self, id: &HubId) -> Option<&HubOverride> {
        self.hubs.get(id)
    }

    pub fn is_discontinued(&self, id: &HubId) -> bool {
        self.hubs.get(id).map(|o| o.discontinued).unwrap_or(false)
    }

    pub fn is_manually_trusted(&self, id: &HubId) -> bool {
        self.manual_trust_nodes.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let yaml = r#"
BootstrapHubs: ["tcp://a.example:9050"]
Hubs:
  hub1:
    Trusted: true
Regions: []
"#;
        let intel = Intel::parse(yaml).unwrap();
        assert_eq!(intel.bootstrap_hubs.len(), 1);
        assert!(intel.get_override(&HubId::from("hub1".to_string())).unwrap().trusted);
    }

    #[test]
    fn region_hop_floor_is_enforced() {
        let region = RegionConfig {
            id: "eu".into(),
            name: "Europe".into(),
            member_policy: String::new(),
            regional_min_lanes: 2,
            regional_max_lanes_on_hub: 2,
            satellite_min_lanes: 1,
            internal_min_lanes_on_hub: 3,
            internal_max_hops: 1,
        };
        assert_eq!(region.effective_internal_max_hops(), INTERNAL_MAX_HOPS_FLOOR);
    }
}
