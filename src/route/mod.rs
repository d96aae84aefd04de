//! Component G: the route finder.
//! Depth-first enumeration of Hub-to-Hub paths under a routing profile, pruning by best-so-far
//! cost/hop budgets and a per-Hub active-session constraint. Grounded on the prior
//! `routing_table_view_v2` (shortest-path selection with least-recently-used tie-breaking);
//! this component generalizes that single shortest-path lookup into a profile-bounded,
//! cost-ranked top-k search, since the prior next-hop table already has shortest paths
//! precomputed and this crate must discover them on demand instead.

pub mod profile;

pub use profile::Profile;

use crate::geoip::Location;
use crate::hub::HubId;
use crate::map::graph::Map;
use crate::map::pin::Pin;
use crate::nearest::{self, Options as NearestOptions, Role, WantVersions};
use rand::seq::SliceRandom;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NoRouteReason {
    #[error("no regarded exits toward the destination")]
    NoRegardedExits,
    #[error("no paths satisfy the routing profile's constraints")]
    NoPathsUnderProfile,
}

/// Hop discount applied when a Pin already carries an active session, to prefer reusing
/// existing connections over opening new ones.
const ACTIVE_HOP_DISCOUNT: f64 = 0.8;

/// Fraction of the cheapest routes shuffled before return.
const SHUFFLE_TOP_FRACTION: f64 = 0.10;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: Vec<HubId>,
    /// Total accumulated cost including the destination's last-mile cost.
    pub total_cost: f64,
    /// The destination's last-mile cost, added exactly once on completion.
    pub dst_cost: f64,
}

#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub target_v4: Option<&'a Location>,
    pub target_v6: Option<&'a Location>,
    pub anycast: bool,
    pub home_location_v4: Option<&'a Location>,
    pub home_location_v6: Option<&'a Location>,
    pub want: WantVersions,
    pub destination_opts: NearestOptions,
    pub transit_opts: NearestOptions,
    pub profile_name: &'a str,
    pub top_k: usize,
}

struct Ctx<'a> {
    nearest_set: &'a HashSet<HubId>,
    destination_opts: &'a NearestOptions,
    transit_opts: &'a NearestOptions,
    target_v4: Option<&'a Location>,
    target_v6: Option<&'a Location>,
    home_location_v4: Option<&'a Location>,
    home_location_v6: Option<&'a Location>,
    anycast: bool,
    profile: Profile,
}

/// `TotalCost`/hop-count of the cheapest completed route found so far, used to tighten pruning
/// as the DFS progresses.
struct Best {
    cost: f64,
    hops: usize,
}

impl Best {
    fn none() -> Self {
        Self { cost: f64::INFINITY, hops: usize::MAX }
    }

    fn consider(&mut self, cost: f64, hops: usize) {
        if cost < self.cost {
            self.cost = cost;
        }
        if hops < self.hops {
            self.hops = hops;
        }
    }

    fn exceeds_budget(&self, cost: f64, hops: usize, profile: &Profile) -> bool {
        if self.cost.is_finite() && cost > self.cost + profile.max_extra_cost as f64 {
            return true;
        }
        if self.hops != usize::MAX && hops > self.hops + profile.max_extra_hops as usize {
            return true;
        }
        false
    }
}

/// Compliance rule: if the candidate Hub already has an active terminal session, the route's
/// entry hop must match the penultimate hop of that session (only one session per Hub).
fn session_compliant(neighbor: &Pin, entering_from: &HubId) -> bool {
    match &neighbor.connection {
        None => true,
        Some(conn) => match &conn.route_penultimate {
            None => true,
            Some(expected) => expected == entering_from,
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    r: &crate::map::graph::MapInner,
    ctx: &Ctx,
    current: &HubId,
    path: &mut Vec<HubId>,
    total_cost: f64,
    best: &mut Best,
    results: &mut Vec<Route>,
    top_k: usize,
) {
    let Some(current_pin) = r.all.get(current) else { return };

    for (neighbor_id, lane) in &current_pin.connected_to {
        if path.contains(neighbor_id) {
            continue; // no duplicate Hub IDs.
        }
        let Some(neighbor_pin) = r.all.get(neighbor_id) else { continue };
        if !session_compliant(neighbor_pin, current) {
            continue;
        }

        let candidate_hops = path.len() + 1;
        if candidate_hops > ctx.profile.max_hops as usize {
            continue;
        }

        let discount = if neighbor_pin.connection.is_some() { ACTIVE_HOP_DISCOUNT } else { 1.0 };
        let hop_cost = (lane.cost + neighbor_pin.cost) * discount;
        let candidate_total = total_cost + hop_cost;

        if best.exceeds_budget(candidate_total, candidate_hops, &ctx.profile) {
            continue;
        }

        let is_destination = nearest::matches(neighbor_pin, ctx.destination_opts, Role::DestinationHub)
            && ctx.nearest_set.contains(neighbor_id);
        if is_destination && candidate_hops >= ctx.profile.min_hops as usize {
            let (eff_v4, eff_v6) =
                nearest::effective_target(ctx.anycast, ctx.target_v4, ctx.target_v6, ctx.home_location_v4, ctx.home_location_v6);
            let proximity = nearest::proximity_for_pin(neighbor_pin, eff_v4, eff_v6).unwrap_or(50);
            let dst_cost = nearest::destination_cost(proximity);
            let route_total = candidate_total + dst_cost;
            if results.len() < top_k * 4 || route_total <= best.cost + ctx.profile.max_extra_cost as f64 {
                path.push(neighbor_id.clone());
                results.push(Route { path: path.clone(), total_cost: route_total, dst_cost });
                path.pop();
                best.consider(route_total, candidate_hops);
            }
        }

        let is_transit = nearest::matches(neighbor_pin, ctx.transit_opts, Role::TransitHub);
        if is_transit && candidate_hops < ctx.profile.max_hops as usize {
            path.push(neighbor_id.clone());
            dfs(r, ctx, neighbor_id, path, candidate_total, best, results, top_k);
            path.pop();
        }
    }
}

/// Route-finder entry point.
pub fn find_routes(map: &Map, query: &Query, rng: &mut impl rand::Rng) -> Result<Vec<Route>, crate::error::Error> {
    let _timer = crate::metrics::ROUTE_FIND_DURATION.with_label_values(&[&map.name, query.profile_name]).start_timer();
    if map.is_empty() {
        return Err(crate::error::Error::EmptyMap);
    }
    let home = map.home().ok_or(crate::error::Error::HomeHubUnset)?;

    let mut profile = profile::by_name(query.profile_name).unwrap_or(profile::SINGLE_HOP);

    let home_covers = {
        let r = map.read();
        r.all.get(&home).map(|p| p.has_ip_version(query.want.v4, query.want.v6)).unwrap_or(false)
    };

    if profile.name == "home" {
        if !home_covers {
            profile = profile::SINGLE_HOP;
        } else {
            let r = map.read();
            let home_pin = &r.all[&home];
            let (eff_v4, eff_v6) = nearest::effective_target(
                query.anycast,
                query.target_v4,
                query.target_v6,
                query.home_location_v4,
                query.home_location_v6,
            );
            let proximity = nearest::proximity_for_pin(home_pin, eff_v4, eff_v6).unwrap_or(50);
            let dst_cost = nearest::destination_cost(proximity);
            return Ok(vec![Route { path: vec![home.clone()], total_cost: home_pin.cost + dst_cost, dst_cost }]);
        }
    }

    let nearest_set: HashSet<HubId> = nearest::search(
        map,
        query.want,
        query.target_v4,
        query.target_v6,
        query.anycast,
        query.home_location_v4,
        query.home_location_v6,
        Role::DestinationHub,
        false,
        &query.destination_opts,
        rng,
    )
    .unwrap_or_default()
    .into_iter()
    .collect();

    if nearest_set.is_empty() {
        return Err(crate::error::Error::NoRoute(NoRouteReason::NoRegardedExits));
    }

    let ctx = Ctx {
        nearest_set: &nearest_set,
        destination_opts: &query.destination_opts,
        transit_opts: &query.transit_opts,
        target_v4: query.target_v4,
        target_v6: query.target_v6,
        home_location_v4: query.home_location_v4,
        home_location_v6: query.home_location_v6,
        anycast: query.anycast,
        profile,
    };

    let r = map.read();
    let mut results = Vec::new();
    let mut best = Best::none();
    let mut path = vec![home.clone()];
    dfs(&r, &ctx, &home, &mut path, 0.0, &mut best, &mut results, query.top_k.max(1));
    drop(r);

    if results.is_empty() {
        return Err(crate::error::Error::NoRoute(NoRouteReason::NoPathsUnderProfile));
    }

    results.sort_by(|a, b| a.total_cost.partial_cmp(&b.total_cost).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(query.top_k.max(1));

    let shuffle_count = ((results.len() as f64) * SHUFFLE_TOP_FRACTION).ceil() as usize;
    let shuffle_count = shuffle_count.min(results.len());
    results[..shuffle_count].shuffle(rng);

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::FixtureGeoIp;
    use crate::map::graph::MapScope;
    use crate::map::lane::Lane;
    use crate::map::state;
    use crate::measurements::Registry;
    use std::sync::Arc;

    fn loc(lat: f64, lon: f64) -> Location {
        Location { country: "US".into(), continent: "NA".into(), asn: 1, as_org: "x".into(), latitude: lat, longitude: lon, anycast: false }
    }

    fn test_map() -> Map {
        Map::new("test", MapScope::Public, Arc::new(Registry::new()), Arc::new(FixtureGeoIp::new()))
    }

    fn add_regarded_pin(map: &Map, id: &str, destination: bool) -> HubId {
        let hub_id = HubId::from(id.to_string());
        map.get_or_create_pin(&hub_id);
        let mut w = map.write();
        let pin = w.all.get_mut(&hub_id).unwrap();
        pin.state.set(state::REACHABLE, true);
        pin.state.set(state::ACTIVE, true);
        pin.entity_v4 = Some(std::net::Ipv4Addr::new(1, 1, 1, 1));
        pin.location_v4 = Some(loc(0.0, if destination { 0.0 } else { 1.0 }));
        hub_id
    }

    fn connect(map: &Map, a: &HubId, b: &HubId, latency_nanos: u64, capacity_bits_per_sec: u64) {
        let lane = Lane::new(capacity_bits_per_sec, latency_nanos);
        let mut w = map.write();
        w.all.get_mut(a).unwrap().connected_to.insert(b.clone(), lane);
        w.all.get_mut(b).unwrap().connected_to.insert(a.clone(), lane);
    }

    fn base_query<'a>(target: &'a Location, profile_name: &'a str) -> Query<'a> {
        Query {
            target_v4: Some(target),
            target_v6: None,
            anycast: false,
            home_location_v4: None,
            home_location_v6: None,
            want: WantVersions { v4: true, v6: false },
            destination_opts: NearestOptions::default(),
            transit_opts: NearestOptions::default(),
            profile_name,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// "Route under double-hop": Home--A (20ms/100Mbit), Home--B (50ms/10Mbit), A--C
    /// (20ms/100Mbit), B--C (50ms/10Mbit), C destination-matched. Expect the cheaper A-side
    /// path to win.
    #[test]
    fn double_hop_prefers_cheaper_lane_path() {
        let map = test_map();
        let home = add_regarded_pin(&map, "home", false);
        map.set_home(home.clone());
        let a = add_regarded_pin(&map, "a", false);
        let b = add_regarded_pin(&map, "b", false);
        let c = add_regarded_pin(&map, "c", true);

        connect(&map, &home, &a, 20_000_000, 100_000_000);
        connect(&map, &home, &b, 50_000_000, 10_000_000);
        connect(&map, &a, &c, 20_000_000, 100_000_000);
        connect(&map, &b, &c, 50_000_000, 10_000_000);

        let target = loc(0.0, 0.0);
        let query = base_query(&target, "double-hop");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1)).unwrap();

        assert_eq!(result[0].path, vec![home, a, c], "the cheaper Home->A->C path must rank first");
    }

    #[test]
    fn no_route_contains_duplicate_hub_ids() {
        let map = test_map();
        let home = add_regarded_pin(&map, "home", false);
        map.set_home(home.clone());
        let a = add_regarded_pin(&map, "a", true);
        let b = add_regarded_pin(&map, "b", true);
        connect(&map, &home, &a, 20_000_000, 100_000_000);
        connect(&map, &a, &b, 20_000_000, 100_000_000);
        connect(&map, &b, &home, 20_000_000, 100_000_000);

        let target = loc(0.0, 0.0);
        let query = base_query(&target, "double-hop");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1)).unwrap();

        for route in &result {
            let unique: std::collections::HashSet<_> = route.path.iter().collect();
            assert_eq!(unique.len(), route.path.len(), "route must not repeat a Hub ID");
        }
    }

    #[test]
    fn every_route_respects_profile_hop_bounds() {
        let map = test_map();
        let home = add_regarded_pin(&map, "home", false);
        map.set_home(home.clone());
        let a = add_regarded_pin(&map, "a", false);
        let c = add_regarded_pin(&map, "c", true);
        connect(&map, &home, &a, 20_000_000, 100_000_000);
        connect(&map, &a, &c, 20_000_000, 100_000_000);

        let target = loc(0.0, 0.0);
        let query = base_query(&target, "double-hop");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1)).unwrap();
        let profile = profile::DOUBLE_HOP;
        for route in &result {
            assert!(route.path.len() - 1 >= profile.min_hops as usize);
            assert!(route.path.len() - 1 <= profile.max_hops as usize);
        }
    }

    #[test]
    fn home_profile_returns_home_only_route_when_home_covers_destination() {
        let map = test_map();
        let home = add_regarded_pin(&map, "home", true);
        map.set_home(home.clone());

        let target = loc(0.0, 0.0);
        let query = base_query(&target, "home");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1)).unwrap();
        assert_eq!(result[0].path, vec![home]);
    }

    #[test]
    fn home_profile_upgrades_to_single_hop_when_home_lacks_ip_family() {
        let map = test_map();
        // Home has no resolved IPv4 entity at all -- `has_ip_version` is false.
        let home_id = HubId::from("home".to_string());
        map.get_or_create_pin(&home_id);
        map.set_home(home_id.clone());
        let a = add_regarded_pin(&map, "a", true);
        connect(&map, &home_id, &a, 20_000_000, 100_000_000);

        let target = loc(0.0, 0.0);
        let query = base_query(&target, "home");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1)).unwrap();
        assert!(result[0].path.len() >= 2, "home doesn't cover the destination's IP family, so it must not return a bare home-only route");
    }

    #[test]
    fn empty_map_errors() {
        let map = test_map();
        let target = loc(0.0, 0.0);
        let query = base_query(&target, "double-hop");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1));
        assert!(matches!(result, Err(crate::error::Error::EmptyMap)));
    }

    #[test]
    fn no_home_hub_set_errors() {
        let map = test_map();
        add_regarded_pin(&map, "a", true);
        let target = loc(0.0, 0.0);
        let query = base_query(&target, "double-hop");
        let result = find_routes(&map, &query, &mut rand::rngs::mock::StepRng::new(0, 1));
        assert!(matches!(result, Err(crate::error::Error::HomeHubUnset)));
    }
}

/// Human-readable per-hop trace for `GET /map/{map}/route/to/{destination}`, distinct from the
/// programmatic `Route` the finder returns: distinguishes "no regarded exits" from "no paths
/// under profile constraints" so the caller can explain why a route failed.
pub fn render_trace(result: &Result<Vec<Route>, crate::error::Error>) -> String {
    match result {
        Ok(routes) => {
            let mut out = String::new();
            for (i, route) in routes.iter().enumerate() {
                let hops: Vec<String> = route.path.iter().map(|h| h.to_string()).collect();
                out.push_str(&format!("{}. {} (cost={:.1})\n", i + 1, hops.join(" -> "), route.total_cost));
            }
            out
        }
        Err(crate::error::Error::NoRoute(NoRouteReason::NoRegardedExits)) => {
            "no route: destination has no regarded exits reachable from this map".to_string()
        }
        Err(crate::error::Error::NoRoute(NoRouteReason::NoPathsUnderProfile)) => {
            "no route: no paths satisfy the selected routing profile's constraints".to_string()
        }
        Err(e) => format!("no route: {e}"),
    }
}
