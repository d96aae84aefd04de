//! Component H: topology optimizer.
//! Periodic analysis producing suggested peer connections. Runs entirely under the map write
//! lock. Grounded on the prior `peer_manager_actor.rs` `monitor_peers` decision ladder
//! (bootstrap-if-isolated, then steady-state target selection), generalized here into the
//! four-way purpose ladder the routing core needs.

use crate::hub::HubId;
use crate::map::graph::{Map, MapInner};
use crate::map::pin::Pin;
use crate::map::state::{self, State};
use crate::measurements::Registry as MeasurementsRegistry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

/// Desegregation is retried at most once per hour.
const DESEGREGATION_BACKOFF_MILLIS: i64 = 3_600_000;

/// Default count of globally cheapest regarded Pins to suggest ("global low cost").
const GLOBAL_LOW_COST_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Purpose {
    Bootstrap,
    Desegregate,
    Wait,
    TargetStructure,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OptimizationResult {
    pub purpose: Purpose,
    pub approach: Vec<String>,
    pub suggested_connections: Vec<HubId>,
    pub max_connect: u32,
    pub stop_others: bool,
}

impl OptimizationResult {
    fn wait() -> Self {
        Self { purpose: Purpose::Wait, approach: vec![], suggested_connections: vec![], max_connect: 0, stop_others: false }
    }
}

fn is_regarded(pin: &Pin) -> bool {
    pin.state.intersects(State::regard_default()) && !pin.state.intersects(State::disregard_default())
}

fn is_connectable(pin: &Pin) -> bool {
    !pin.state.intersects(State::disregard_default())
}

/// Per-map optimizer state: only the desegregation back-off timestamp survives across runs, and
/// only in memory.
pub struct Optimizer {
    last_desegregation_attempt_millis: AtomicI64,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self { last_desegregation_attempt_millis: AtomicI64::new(0) }
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(target = "spn::optimizer", level = "debug", skip_all, fields(map = %map.name))]
    pub fn run(&self, map: &Map, measurements_enabled: bool, now_millis: i64) -> Result<OptimizationResult, crate::error::Error> {
        if map.is_empty() {
            return Err(crate::error::Error::EmptyMap);
        }
        let home = map.home().ok_or(crate::error::Error::HomeHubUnset)?;

        let mut w = map.write();
        for pin in w.all.values_mut() {
            pin.analysis = Default::default();
        }

        let result = self.compute(&mut w, map.measurements.as_ref(), &home, measurements_enabled, now_millis);

        for pin in w.all.values_mut() {
            pin.analysis = Default::default();
        }

        let purpose_label = match result.purpose {
            Purpose::Bootstrap => "bootstrap",
            Purpose::Desegregate => "desegregate",
            Purpose::Wait => "wait",
            Purpose::TargetStructure => "target_structure",
        };
        crate::metrics::OPTIMIZER_RUNS.with_label_values(&[&map.name, purpose_label]).inc();

        Ok(result)
    }

    fn compute(
        &self,
        w: &mut MapInner,
        measurements: &MeasurementsRegistry,
        home: &HubId,
        measurements_enabled: bool,
        now_millis: i64,
    ) -> OptimizationResult {
        let regarded: Vec<HubId> = w.all.iter().filter(|(id, p)| *id != home && is_regarded(p)).map(|(id, _)| id.clone()).collect();
        let connectable: Vec<HubId> = w.all.iter().filter(|(id, p)| *id != home && is_connectable(p)).map(|(id, _)| id.clone()).collect();

        // Step 1: bootstrap.
        if regarded.is_empty() && !connectable.is_empty() {
            let cheapest = cheapest_of(w, &connectable);
            if let Some(id) = cheapest {
                mark_suggested(w, &id, None);
                return OptimizationResult {
                    purpose: Purpose::Bootstrap,
                    approach: vec!["bootstrap".to_string()],
                    suggested_connections: vec![id],
                    max_connect: 1,
                    stop_others: false,
                };
            }
        }

        // Step 2: desegregate.
        let last_attempt = self.last_desegregation_attempt_millis.load(Ordering::Relaxed);
        let backed_off = now_millis.saturating_sub(last_attempt) < DESEGREGATION_BACKOFF_MILLIS;
        if !backed_off && !connectable.is_empty() && regarded.len() * 2 <= connectable.len() {
            let unreached: Vec<HubId> = connectable.iter().filter(|id| !w.all[*id].state.has(state::REACHABLE)).cloned().collect();
            if let Some(id) = cheapest_of(w, &unreached) {
                self.last_desegregation_attempt_millis.store(now_millis, Ordering::Relaxed);
                mark_suggested(w, &id, None);
                return OptimizationResult {
                    purpose: Purpose::Desegregate,
                    approach: vec!["desegregate".to_string()],
                    suggested_connections: vec![id],
                    max_connect: 1,
                    stop_others: false,
                };
            }
        }

        // Step 3: wait for measurements.
        if measurements_enabled && !regarded.is_empty() {
            let valid = regarded.iter().filter(|id| measurements.get_or_create(id).snapshot().calculated_cost < crate::measurements::MAX_COST).count();
            if (valid as f64) < 0.5 * regarded.len() as f64 {
                return OptimizationResult::wait();
            }
        }

        // Step 4: target structure (steady state).
        self.target_structure(w, home, &regarded)
    }

    fn target_structure(&self, w: &mut MapInner, home: &HubId, regarded: &[HubId]) -> OptimizationResult {
        let mut suggested: Vec<HubId> = Vec::new();
        let home_region = w.all.get(home).and_then(|p| p.region.clone());

        // Global low cost.
        let mut by_cost = regarded.to_vec();
        sort_by_cost(w, &mut by_cost);
        for id in by_cost.into_iter().take(GLOBAL_LOW_COST_COUNT) {
            mark_suggested(w, &id, None);
            suggested.push(id);
        }

        if let Some(region_id) = home_region.clone() {
            let (internal_min, internal_max_hops) = w
                .regions
                .iter()
                .find(|r| r.id == region_id)
                .map(|r| (r.internal_min_lanes_on_hub, r.internal_max_hops))
                .unwrap_or((0, crate::intel::INTERNAL_MAX_HOPS_FLOOR));

            // Regional low cost.
            let mut in_region: Vec<HubId> = regarded.iter().filter(|id| w.all[*id].region.as_deref() == Some(region_id.as_str())).cloned().collect();
            sort_by_cost(w, &mut in_region);
            for id in in_region.iter().take(internal_min as usize) {
                if mark_suggested(w, id, Some(&region_id)) {
                    suggested.push(id.clone());
                }
            }

            // Regional hop constraint: top up until every regarded region
            // peer's SuggestedHopDistanceInRegion satisfies the bound, or
            // there is nothing left to add.
            let mut remaining: Vec<HubId> = in_region.iter().filter(|id| !suggested.contains(id)).cloned().collect();
            sort_by_cost(w, &mut remaining);
            loop {
                let violated = in_region
                    .iter()
                    .any(|id| w.all[id].analysis.suggested_hop_distance_in_region.map(|d| d > internal_max_hops).unwrap_or(true));
                if !violated || remaining.is_empty() {
                    break;
                }
                let next = remaining.remove(0);
                if mark_suggested(w, &next, Some(&region_id)) {
                    suggested.push(next);
                }
            }

            // Region-to-region.
            region_to_region(w, &region_id, regarded, &mut suggested);
        } else {
            // Satellite-to-region: home has no region of its own.
            let region_ids: Vec<String> = w.regions.iter().map(|r| r.id.clone()).collect();
            for region_id in region_ids {
                let satellite_min = w.regions.iter().find(|r| r.id == region_id).map(|r| r.satellite_min_lanes).unwrap_or(0);
                let mut candidates: Vec<HubId> = regarded.iter().filter(|id| w.all[*id].region.as_deref() == Some(region_id.as_str())).cloned().collect();
                sort_by_cost(w, &mut candidates);
                for id in candidates.into_iter().take(satellite_min as usize) {
                    if mark_suggested(w, &id, None) {
                        suggested.push(id);
                    }
                }
            }
        }

        OptimizationResult {
            purpose: Purpose::TargetStructure,
            approach: vec!["target-structure".to_string()],
            suggested_connections: suggested,
            max_connect: 3,
            stop_others: true,
        }
    }
}

fn cheapest_of(w: &MapInner, ids: &[HubId]) -> Option<HubId> {
    ids.iter().min_by(|a, b| w.all[*a].cost.partial_cmp(&w.all[*b].cost).unwrap_or(std::cmp::Ordering::Equal)).cloned()
}

fn sort_by_cost(w: &MapInner, ids: &mut [HubId]) {
    ids.sort_by(|a, b| w.all[a].cost.partial_cmp(&w.all[b].cost).unwrap_or(std::cmp::Ordering::Equal));
}

/// Marks `id` as suggested and propagates the improved hop distance through its reachable
/// regarded neighbors, returning `false` if it was already suggested.
fn mark_suggested(w: &mut MapInner, id: &HubId, region_scope: Option<&str>) -> bool {
    let Some(pin) = w.all.get_mut(id) else { return false };
    if pin.analysis.suggested {
        return false;
    }
    pin.analysis.suggested = true;
    propagate_suggested_hop_distance(w, id, region_scope);
    true
}

fn propagate_suggested_hop_distance(w: &mut MapInner, source: &HubId, region_scope: Option<&str>) {
    if let Some(pin) = w.all.get_mut(source) {
        pin.analysis.suggested_hop_distance = Some(0);
        if region_scope.is_some() && pin.region.as_deref() == region_scope {
            pin.analysis.suggested_hop_distance_in_region = Some(0);
        }
    }

    let mut queue = VecDeque::new();
    queue.push_back(source.clone());
    while let Some(current) = queue.pop_front() {
        let Some(current_pin) = w.all.get(&current) else { continue };
        let current_dist = current_pin.analysis.suggested_hop_distance.unwrap_or(0);
        let current_dist_in_region = current_pin.analysis.suggested_hop_distance_in_region;
        let neighbors: Vec<HubId> = current_pin.connected_to.keys().cloned().collect();

        for neighbor_id in neighbors {
            let Some(neighbor) = w.all.get(&neighbor_id) else { continue };
            if !is_regarded(neighbor) {
                continue;
            }
            let candidate = current_dist + 1;
            let improves = neighbor.analysis.suggested_hop_distance.map(|d| candidate < d).unwrap_or(true);
            if improves {
                w.all.get_mut(&neighbor_id).unwrap().analysis.suggested_hop_distance = Some(candidate);
                queue.push_back(neighbor_id.clone());
            }

            if let (Some(scope), Some(cd)) = (region_scope, current_dist_in_region) {
                if w.all[&neighbor_id].region.as_deref() == Some(scope) {
                    let candidate_r = cd + 1;
                    let improves_r =
                        w.all[&neighbor_id].analysis.suggested_hop_distance_in_region.map(|d| candidate_r < d).unwrap_or(true);
                    if improves_r {
                        w.all.get_mut(&neighbor_id).unwrap().analysis.suggested_hop_distance_in_region = Some(candidate_r);
                    }
                }
            }
        }
    }
}

/// "Region-to-region": for each other region, ensure home's region carries at least
/// `regionalMinLanes` lanes into it, supplanting an existing expensive cross-regional lane if
/// under budget, bounded per Hub by `regionalMaxLanesOnHub`.
fn region_to_region(w: &mut MapInner, home_region_id: &str, regarded: &[HubId], suggested: &mut Vec<HubId>) {
    let other_regions: Vec<(String, u32, u32)> =
        w.regions.iter().filter(|r| r.id != home_region_id).map(|r| (r.id.clone(), r.regional_min_lanes, r.regional_max_lanes_on_hub)).collect();

    let home_region_pins: Vec<HubId> = regarded.iter().filter(|id| w.all[*id].region.as_deref() == Some(home_region_id)).cloned().collect();

    // existing_lanes[region] = count of lanes from our region into it.
    // worst_cost[region] = the most expensive such lane's cost.
    let mut existing_lanes: HashMap<String, u32> = HashMap::new();
    let mut worst_cost: HashMap<String, f64> = HashMap::new();
    let mut hub_cross_connections: HashMap<HubId, u32> = HashMap::new();

    for id in &home_region_pins {
        for (peer, lane) in &w.all[id].connected_to {
            let Some(peer_region) = w.all.get(peer).and_then(|p| p.region.clone()) else { continue };
            if peer_region == home_region_id {
                continue;
            }
            *existing_lanes.entry(peer_region.clone()).or_insert(0) += 1;
            *hub_cross_connections.entry(id.clone()).or_insert(0) += 1;
            let entry = worst_cost.entry(peer_region).or_insert(lane.cost);
            if lane.cost > *entry {
                *entry = lane.cost;
            }
        }
    }

    for (region_id, min_lanes, max_per_hub) in other_regions {
        let existing = *existing_lanes.get(&region_id).unwrap_or(&0);
        let mut candidates: Vec<HubId> = regarded.iter().filter(|id| w.all[*id].region.as_deref() == Some(region_id.as_str())).cloned().collect();
        sort_by_cost(w, &mut candidates);

        if existing < min_lanes {
            let needed = (min_lanes - existing).min(max_per_hub);
            for id in candidates.into_iter().take(needed as usize) {
                if mark_suggested(w, &id, None) {
                    suggested.push(id);
                }
            }
            continue;
        }

        // Already at minimum: only supplant if some home-region Hub's
        // existing cross lane to this region costs more than the cheapest
        // unconnected candidate, and that Hub is still under its per-hub cap.
        if let (Some(&worst), Some(cheapest)) = (worst_cost.get(&region_id), candidates.first()) {
            if w.all[cheapest].cost < worst {
                let under_cap = home_region_pins.iter().any(|id| *hub_cross_connections.get(id).unwrap_or(&0) < max_per_hub);
                if under_cap {
                    let id = cheapest.clone();
                    if mark_suggested(w, &id, None) {
                        suggested.push(id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::FixtureGeoIp;
    use crate::map::graph::MapScope;
    use std::sync::Arc;

    fn id(s: &str) -> HubId {
        HubId::from(s.to_string())
    }

    fn test_map() -> Map {
        Map::new("test", MapScope::Public, Arc::new(MeasurementsRegistry::new()), Arc::new(FixtureGeoIp::new()))
    }

    fn add_pin(map: &Map, name: &str, regarded: bool) -> HubId {
        let hub_id = id(name);
        map.get_or_create_pin(&hub_id);
        let mut w = map.write();
        let pin = w.all.get_mut(&hub_id).unwrap();
        if regarded {
            pin.state.set(state::REACHABLE, true);
            pin.state.set(state::ACTIVE, true);
        }
        hub_id
    }

    #[test]
    fn bootstrap_when_no_regarded_pins() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        let candidate = add_pin(&map, "candidate", false);
        let opt = Optimizer::new();
        let result = opt.run(&map, false, 1_000).unwrap();
        assert_eq!(result.purpose, Purpose::Bootstrap);
        assert_eq!(result.suggested_connections, vec![candidate]);
        assert_eq!(result.max_connect, 1);
    }

    #[test]
    fn desegregate_when_half_or_fewer_connectable_are_regarded() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        add_pin(&map, "regarded1", true);
        add_pin(&map, "unreached1", false);
        add_pin(&map, "unreached2", false);
        let opt = Optimizer::new();
        let result = opt.run(&map, false, 1_000).unwrap();
        assert_eq!(result.purpose, Purpose::Desegregate);
    }

    #[test]
    fn wait_when_measurements_enabled_and_insufficient() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        add_pin(&map, "a", true);
        add_pin(&map, "b", true);
        let opt = Optimizer::new();
        let result = opt.run(&map, true, 1_000).unwrap();
        assert_eq!(result.purpose, Purpose::Wait);
    }

    #[test]
    fn target_structure_suggests_cheapest_global() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        let cheap = add_pin(&map, "cheap", true);
        let expensive = add_pin(&map, "expensive", true);
        {
            let mut w = map.write();
            w.all.get_mut(&cheap).unwrap().cost = 10.0;
            w.all.get_mut(&expensive).unwrap().cost = 10_000.0;
        }
        let opt = Optimizer::new();
        let result = opt.run(&map, false, 1_000).unwrap();
        assert_eq!(result.purpose, Purpose::TargetStructure);
        assert!(result.suggested_connections.contains(&cheap));
    }

    #[test]
    fn analysis_scratch_is_cleared_after_run() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        add_pin(&map, "a", true);
        add_pin(&map, "b", true);
        let opt = Optimizer::new();
        let _ = opt.run(&map, false, 1_000).unwrap();
        let r = map.read();
        assert!(r.all.values().all(|p| !p.analysis.suggested));
    }
}
