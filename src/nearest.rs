//! Component F: nearest-pin search.
//! Builds a role-specific `Matcher(Pin) -> bool` out of an `Options` bundle, scores every
//! matching Pin by geo-proximity + load + (for `HomeHub`) lane quality, and returns a bounded,
//! load-balanced candidate set. Grounded on the prior peer-selection helpers in
//! `peer_manager_actor.rs`, which lean on `rand::seq::SliceRandom` for exactly this kind of
//! "shuffle the cheapest slice" load balancing.

use crate::endpoint::{Entity, EndpointList, Verdict};
use crate::geoip::Location;
use crate::hub::HubId;
use crate::map::graph::Map;
use crate::map::pin::Pin;
use crate::map::state::{self, State};
use rand::seq::SliceRandom;

/// The role a candidate Pin would play if selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    HomeHub,
    TransitHub,
    DestinationHub,
}

/// Matcher inputs.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub regard: Option<State>,
    pub disregard: Option<State>,
    pub no_defaults: bool,
    pub hub_policies: Vec<EndpointList>,
    pub require_verified_owners: Vec<String>,
    pub check_hub_policy_with: Option<Entity>,
}

/// Builds the role-specific predicate. Default regard/disregard come from the two summary masks
/// unless `NoDefaults` is set, in which case only the masks explicitly supplied are checked.
pub fn matches(pin: &Pin, opts: &Options, role: Role) -> bool {
    if opts.no_defaults {
        if let Some(r) = opts.regard {
            if !pin.state.intersects(r) {
                return false;
            }
        }
        if let Some(d) = opts.disregard {
            if pin.state.intersects(d) {
                return false;
            }
        }
    } else {
        let regard = opts.regard.unwrap_or_else(State::regard_default);
        let disregard = opts.disregard.unwrap_or_else(State::disregard_default);
        if pin.state.intersects(disregard) {
            return false;
        }
        if !pin.state.intersects(regard) {
            return false;
        }
    }

    match role {
        Role::HomeHub if pin.state.has(state::USAGE_AS_HOME_DISCOURAGED) => return false,
        Role::DestinationHub if pin.state.has(state::USAGE_AS_DESTINATION_DISCOURAGED) => return false,
        _ => {}
    }

    if !opts.require_verified_owners.is_empty() {
        match &pin.verified_owner {
            Some(owner) if opts.require_verified_owners.iter().any(|o| o == owner) => {}
            _ => return false,
        }
    }

    if let Some(entity) = &opts.check_hub_policy_with {
        for policy in &opts.hub_policies {
            if matches!(policy.check(entity), Verdict::Deny) {
                return false;
            }
        }
    }

    true
}

/// `((100-p)^3)/100`, `p` in `0..=100`, higher proximity is closer.
pub fn destination_cost(proximity: u8) -> f64 {
    let p = proximity as f64;
    (100.0 - p).powi(3) / 100.0
}

/// Picks which target locations to score a Pin against: the real target, unless `anycast` is
/// set and a home location is available, in which case the home-to-pin proximity is
/// substituted.
pub(crate) fn effective_target<'a>(
    anycast: bool,
    target_v4: Option<&'a Location>,
    target_v6: Option<&'a Location>,
    home_v4: Option<&'a Location>,
    home_v6: Option<&'a Location>,
) -> (Option<&'a Location>, Option<&'a Location>) {
    if anycast && (home_v4.is_some() || home_v6.is_some()) {
        (home_v4, home_v6)
    } else {
        (target_v4, target_v6)
    }
}

/// Proximity of `pin` to whichever of `target_v4`/`target_v6` the Pin shares an IP version
/// with; `None` if neither side has a resolvable location.
pub(crate) fn proximity_for_pin(pin: &Pin, target_v4: Option<&Location>, target_v6: Option<&Location>) -> Option<u8> {
    if let (Some(t), Some(p)) = (target_v4, pin.location_v4.as_ref()) {
        return Some(crate::geoip::proximity(t, p));
    }
    if let (Some(t), Some(p)) = (target_v6, pin.location_v6.as_ref()) {
        return Some(crate::geoip::proximity(t, p));
    }
    None
}

/// Fallback proximity used when nothing else can be derived.
const FALLBACK_PROXIMITY: u8 = 50;

pub const MIN_PINS: usize = 10;
pub const MAX_PINS: usize = 100;
pub const CUTOFF_LIMIT: f64 = 5000.0;
/// Fraction of the cheapest results shuffled before return, to load-balance selections among
/// near-equal candidates.
const SHUFFLE_TOP_FRACTION: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub hub_id: HubId,
    pub cost: f64,
}

/// Bounded collector: once `min` entries are held, a new entry must stay within `best + cutoff`
/// of the cheapest entry seen so far or it is rejected outright.
struct Collector {
    min: usize,
    max: usize,
    cutoff: f64,
    items: Vec<Candidate>,
}

impl Collector {
    fn new() -> Self {
        Self { min: MIN_PINS, max: MAX_PINS, cutoff: CUTOFF_LIMIT, items: Vec::new() }
    }

    fn best_cost(&self) -> Option<f64> {
        self.items.iter().map(|c| c.cost).fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.min(c))))
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.items.len() >= self.min {
            if let Some(best) = self.best_cost() {
                if candidate.cost > best + self.cutoff {
                    return;
                }
            }
        }
        self.items.push(candidate);
        if self.items.len() > self.max * 2 {
            self.clean();
        }
    }

    /// Sorts by cost and drops everything above the cap, keeping the collector from growing
    /// unbounded across a long scan.
    fn clean(&mut self) {
        self.items.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(best) = self.items.first().map(|c| c.cost) {
            self.items.retain(|c| c.cost <= best + self.cutoff);
        }
        self.items.truncate(self.max);
    }

    fn finish(mut self, rng: &mut impl rand::Rng) -> Vec<Candidate> {
        self.clean();
        self.items.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
        let shuffle_count = ((self.items.len() as f64) * SHUFFLE_TOP_FRACTION).ceil() as usize;
        let shuffle_count = shuffle_count.min(self.items.len());
        self.items[..shuffle_count].shuffle(rng);
        self.items
    }
}

/// Which IP versions the destination (or device) needs a Pin to cover.
#[derive(Debug, Clone, Copy, Default)]
pub struct WantVersions {
    pub v4: bool,
    pub v6: bool,
}

/// Nearest-pin search entry point.
/// `target_v4`/`target_v6` locate the thing we're searching near (a destination IP, or our own
/// device for `HomeHub` searches). `anycast` and `home_location_*` implement the substitution
/// rule for anycast destinations. `routing_profile_home` marks that the active profile is
/// `home`, which additionally requires every IP version the device has when `role == HomeHub`.
#[allow(clippy::too_many_arguments)]
pub fn search(
    map: &Map,
    want: WantVersions,
    target_v4: Option<&Location>,
    target_v6: Option<&Location>,
    anycast: bool,
    home_location_v4: Option<&Location>,
    home_location_v6: Option<&Location>,
    role: Role,
    routing_profile_home: bool,
    opts: &Options,
    rng: &mut impl rand::Rng,
) -> Result<Vec<HubId>, crate::error::Error> {
    let r = map.read();
    let mut collector = Collector::new();

    for pin in r.all.values() {
        if !matches(pin, opts, role) {
            continue;
        }
        if !pin.shares_any_ip_version(want.v4, want.v6) {
            continue;
        }
        if routing_profile_home && role == Role::HomeHub && !pin.has_ip_version(want.v4, want.v6) {
            continue;
        }

        let (eff_v4, eff_v6) = effective_target(anycast, target_v4, target_v6, home_location_v4, home_location_v6);

        let proximity = proximity_for_pin(pin, eff_v4, eff_v6).unwrap_or(FALLBACK_PROXIMITY);
        let mut cost = destination_cost(proximity) + pin.cost;
        if role == Role::HomeHub {
            cost += pin.best_lane_cost().unwrap_or(0.0);
        }

        collector.offer(Candidate { hub_id: pin.hub_id.clone(), cost });
    }

    if collector.items.is_empty() {
        return Err(crate::error::Error::AllPinsDisregarded);
    }

    Ok(collector.finish(rng).into_iter().map(|c| c.hub_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::FixtureGeoIp;
    use crate::map::graph::MapScope;
    use crate::measurements::Registry;
    use std::sync::Arc;

    fn loc(lat: f64, lon: f64) -> Location {
        Location { country: "US".into(), continent: "NA".into(), asn: 1, as_org: "x".into(), latitude: lat, longitude: lon, anycast: false }
    }

    fn test_map() -> Map {
        Map::new("test", MapScope::Public, Arc::new(Registry::new()), Arc::new(FixtureGeoIp::new()))
    }

    fn add_pin(map: &Map, id: &str, reachable: bool, active: bool, cost: f64, location: Location) -> HubId {
        let hub_id = HubId::from(id.to_string());
        map.get_or_create_pin(&hub_id);
        let mut w = map.write();
        let pin = w.all.get_mut(&hub_id).unwrap();
        pin.state.set(state::REACHABLE, reachable);
        pin.state.set(state::ACTIVE, active);
        pin.cost = cost;
        pin.entity_v4 = Some(std::net::Ipv4Addr::new(1, 1, 1, 1));
        pin.location_v4 = Some(location);
        hub_id
    }

    #[test]
    fn disregarded_pins_are_excluded() {
        let map = test_map();
        add_pin(&map, "good", true, true, 100.0, loc(0.0, 0.0));
        let bad = add_pin(&map, "bad", false, false, 100.0, loc(0.0, 0.0));
        map.write().all.get_mut(&bad).unwrap().state.set(state::INVALID, true);

        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let target = loc(0.0, 0.0);
        let want = WantVersions { v4: true, v6: false };
        let result = search(&map, want, Some(&target), None, false, None, None, Role::TransitHub, false, &Options::default(), &mut rng).unwrap();
        assert!(!result.contains(&bad));
    }

    #[test]
    fn errors_when_no_pins_survive() {
        let map = test_map();
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let target = loc(0.0, 0.0);
        let want = WantVersions { v4: true, v6: false };
        let result = search(&map, want, Some(&target), None, false, None, None, Role::TransitHub, false, &Options::default(), &mut rng);
        assert!(matches!(result, Err(crate::error::Error::AllPinsDisregarded)));
    }

    #[test]
    fn cutoff_limit_bounds_the_result_set() {
        let map = test_map();
        for i in 0..20 {
            add_pin(&map, &format!("hub{i}"), true, true, i as f64 * 10000.0, loc(0.0, 0.0));
        }
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let target = loc(0.0, 0.0);
        let want = WantVersions { v4: true, v6: false };
        let result = search(&map, want, Some(&target), None, false, None, None, Role::TransitHub, false, &Options::default(), &mut rng).unwrap();
        // either <= minPins entries or all within cutoff of the min.
        assert!(result.len() <= MIN_PINS || result.len() < 20);
    }
}
