//! `Region`.

use crate::endpoint::{Entity, EndpointList, Verdict};
use crate::hub::HubId;
use std::collections::HashSet;

pub struct Region {
    pub id: String,
    pub name: String,
    pub member_policy: EndpointList,
    pub pins: HashSet<HubId>,
    pub regarded_pins: HashSet<HubId>,
    pub regional_min_lanes: u32,
    pub regional_max_lanes_on_hub: u32,
    pub satellite_min_lanes: u32,
    pub internal_min_lanes_on_hub: u32,
    pub internal_max_hops: u32,
}

impl Region {
    pub fn from_config(cfg: &crate::intel::RegionConfig) -> Result<Self, crate::endpoint::ParseError> {
        Ok(Self {
            id: cfg.id.clone(),
            name: cfg.name.clone(),
            member_policy: EndpointList::parse(&cfg.member_policy)?,
            pins: HashSet::new(),
            regarded_pins: HashSet::new(),
            regional_min_lanes: cfg.regional_min_lanes,
            regional_max_lanes_on_hub: cfg.regional_max_lanes_on_hub,
            satellite_min_lanes: cfg.satellite_min_lanes,
            internal_min_lanes_on_hub: cfg.internal_min_lanes_on_hub,
            internal_max_hops: cfg.effective_internal_max_hops(),
        })
    }
}

/// Re-evaluates which region (if any) a Pin belongs to, given its current entities. Regions are
/// checked in list order; the first whose `member_policy` permits any of the Pin's entities
/// wins.
pub fn assign<'a>(regions: &'a [Region], entities: &[Entity]) -> Option<&'a str> {
    regions
        .iter()
        .find(|r| entities.iter().any(|e| matches!(r.member_policy.check(e), Verdict::Permit)))
        .map(|r| r.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn region(id: &str, member_policy: &str) -> Region {
        let cfg = crate::intel::RegionConfig {
            id: id.to_string(),
            name: id.to_string(),
            member_policy: member_policy.to_string(),
            regional_min_lanes: 2,
            regional_max_lanes_on_hub: 2,
            satellite_min_lanes: 1,
            internal_min_lanes_on_hub: 3,
            internal_max_hops: 3,
        };
        Region::from_config(&cfg).unwrap()
    }

    fn entity(ip: Ipv4Addr) -> Entity {
        Entity::from_ip(ip.into())
    }

    #[test]
    fn assigns_to_first_region_whose_policy_permits() {
        let regions = vec![region("eu", "+ 10.0.0.0/8"), region("us", "+ 10.0.0.0/8")];
        let entities = vec![entity(Ipv4Addr::new(10, 1, 2, 3))];
        assert_eq!(assign(&regions, &entities), Some("eu"));
    }

    #[test]
    fn falls_through_to_later_region_when_earlier_denies() {
        let regions = vec![region("eu", "+ 192.168.0.0/16"), region("us", "+ 10.0.0.0/8")];
        let entities = vec![entity(Ipv4Addr::new(10, 1, 2, 3))];
        assert_eq!(assign(&regions, &entities), Some("us"));
    }

    #[test]
    fn none_when_no_region_permits_any_entity() {
        let regions = vec![region("eu", "+ 192.168.0.0/16")];
        let entities = vec![entity(Ipv4Addr::new(8, 8, 8, 8))];
        assert_eq!(assign(&regions, &entities), None);
    }

    #[test]
    fn empty_region_list_yields_none() {
        let entities = vec![entity(Ipv4Addr::new(8, 8, 8, 8))];
        assert_eq!(assign(&[], &entities), None);
    }
}
