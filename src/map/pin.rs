//! `Pin`: a Hub as seen on a specific map.

use super::lane::Lane;
use super::state::State;
use crate::geoip::Location;
use crate::hub::HubId;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// An active terminal connection from this node through a Pin, used to enforce the "one session
/// per Hub" route-finder constraint.
#[derive(Debug, Clone)]
pub struct Connection {
    pub terminal: HubId,
    /// The penultimate hop of the route this connection was established over, i.e. the hop
    /// immediately before this Pin.
    pub route_penultimate: Option<HubId>,
}

/// Per-Pin scratch state used only while the optimizer (component H) is running a single
/// analysis pass.
#[derive(Debug, Clone, Default)]
pub struct CrossRegional {
    pub connections: u32,
    pub lowest_cost_lane: Option<f64>,
    pub lane_costs: Vec<f64>,
    pub highest_cost_in_hub_limit: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub suggested: bool,
    pub suggested_hop_distance: Option<u32>,
    pub suggested_hop_distance_in_region: Option<u32>,
    pub cross_regional: CrossRegional,
}

pub struct Pin {
    pub hub_id: HubId,
    pub entity_v4: Option<Ipv4Addr>,
    pub entity_v6: Option<Ipv6Addr>,
    pub location_v4: Option<Location>,
    pub location_v6: Option<Location>,
    pub state: State,
    pub verified_owner: Option<String>,
    pub hop_distance: Option<u32>,
    pub cost: f64,
    pub connected_to: HashMap<HubId, Lane>,
    pub failing_until_millis: Option<i64>,
    pub connection: Option<Connection>,
    pub region: Option<String>,
    pub analysis: Analysis,
}

impl Pin {
    pub fn new(hub_id: HubId) -> Self {
        Self {
            hub_id,
            entity_v4: None,
            entity_v6: None,
            location_v4: None,
            location_v6: None,
            state: State::NONE,
            verified_owner: None,
            hop_distance: None,
            cost: 0.0,
            connected_to: HashMap::new(),
            failing_until_millis: None,
            connection: None,
            region: None,
            analysis: Analysis::default(),
        }
    }

    pub fn is_regarded(&self) -> bool {
        self.state.regard()
    }

    pub fn is_disregarded(&self) -> bool {
        self.state.disregard()
    }

    pub fn has_ip_version(&self, want_v4: bool, want_v6: bool) -> bool {
        (!want_v4 || self.entity_v4.is_some()) && (!want_v6 || self.entity_v6.is_some())
    }

    pub fn shares_any_ip_version(&self, want_v4: bool, want_v6: bool) -> bool {
        (want_v4 && self.entity_v4.is_some()) || (want_v6 && self.entity_v6.is_some())
    }

    /// The Pin's own best advertised lane cost, used by nearest-pin search for `HomeHub`
    /// candidates.
    pub fn best_lane_cost(&self) -> Option<f64> {
        self.connected_to.values().map(|l| l.cost).fold(None, |acc, c| {
            Some(acc.map_or(c, |a: f64| a.min(c)))
        })
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pin")
            .field("hub_id", &self.hub_id)
            .field("state", &self.state)
            .field("cost", &self.cost)
            .field("hop_distance", &self.hop_distance)
            .finish()
    }
}

/// Flattened, serializable view of a Pin pushed by the broadcaster.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PinExport {
    pub hub_id: HubId,
    pub state: u16,
    pub cost: f64,
    pub hop_distance: Option<u32>,
    pub region: Option<String>,
    pub path_to_home: Option<Vec<HubId>>,
    pub deleted: bool,
}

impl Pin {
    pub fn export(&self, deleted: bool, path_to_home: Option<Vec<HubId>>) -> PinExport {
        PinExport {
            hub_id: self.hub_id.clone(),
            state: self.state.0,
            cost: self.cost,
            hop_distance: self.hop_distance,
            region: self.region.clone(),
            path_to_home,
            deleted,
        }
    }
}

/// Registers a Pin under the shared measurements registry so callers don't need to thread
/// `Arc<Measurements>` through every constructor site.
pub fn measurements_for(registry: &crate::measurements::Registry, hub_id: &HubId) -> Arc<crate::measurements::Measurements> {
    registry.get_or_create(hub_id)
}
