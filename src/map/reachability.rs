//! Reachability propagation.

use super::pin::Pin;
use super::state;
use crate::hub::HubId;
use std::collections::{HashMap, VecDeque};

/// Clears `Reachable`/`HopDistance` on all pins, then relaxes distances from `home` via a BFS
/// that never traverses through disregarded pins (but does mark direct neighbors of regarded
/// ones). Home's distance is 1; directly connected pins get 2.
pub fn recalculate(pins: &mut HashMap<HubId, Pin>, home: &HubId) {
    for pin in pins.values_mut() {
        pin.state.set(state::REACHABLE, false);
        pin.hop_distance = None;
    }

    if !pins.contains_key(home) {
        return;
    }

    let mut queue = VecDeque::new();
    {
        let home_pin = pins.get_mut(home).unwrap();
        home_pin.state.set(state::REACHABLE, true);
        home_pin.hop_distance = Some(1);
    }
    queue.push_back(home.clone());

    while let Some(current_id) = queue.pop_front() {
        let current_disregarded = pins.get(&current_id).map(|p| p.is_disregarded()).unwrap_or(true);
        if current_disregarded && current_id != *home {
            // Disregarded pins (other than home) do not propagate further,
            // though they may themselves have been marked reachable as a
            // direct neighbor below.
            continue;
        }
        let current_dist = pins.get(&current_id).and_then(|p| p.hop_distance).unwrap_or(1);
        let neighbor_ids: Vec<HubId> = pins.get(&current_id).map(|p| p.connected_to.keys().cloned().collect()).unwrap_or_default();
        for neighbor_id in neighbor_ids {
            let candidate_dist = current_dist + 1;
            let Some(neighbor) = pins.get_mut(&neighbor_id) else { continue };
            let improves = neighbor.hop_distance.map(|d| candidate_dist < d).unwrap_or(true);
            if improves {
                neighbor.hop_distance = Some(candidate_dist);
                neighbor.state.set(state::REACHABLE, true);
                if !neighbor.is_disregarded() {
                    queue.push_back(neighbor_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::lane::Lane;

    fn id(s: &str) -> HubId {
        HubId::from(s.to_string())
    }

    fn link(pins: &mut HashMap<HubId, Pin>, a: &str, b: &str) {
        let lane = Lane::new(100_000_000, 10_000_000);
        pins.get_mut(&id(a)).unwrap().connected_to.insert(id(b), lane);
        pins.get_mut(&id(b)).unwrap().connected_to.insert(id(a), lane);
    }

    #[test]
    fn home_and_direct_neighbor_distances() {
        let mut pins = HashMap::new();
        pins.insert(id("home"), Pin::new(id("home")));
        pins.insert(id("a"), Pin::new(id("a")));
        link(&mut pins, "home", "a");

        recalculate(&mut pins, &id("home"));
        assert_eq!(pins[&id("home")].hop_distance, Some(1));
        assert_eq!(pins[&id("a")].hop_distance, Some(2));
        assert!(pins[&id("a")].state.has(state::REACHABLE));
    }

    #[test]
    fn reachability_does_not_propagate_through_disregarded_pin() {
        let mut pins = HashMap::new();
        pins.insert(id("home"), Pin::new(id("home")));
        pins.insert(id("bad"), Pin::new(id("bad")));
        pins.insert(id("far"), Pin::new(id("far")));
        link(&mut pins, "home", "bad");
        link(&mut pins, "bad", "far");
        pins.get_mut(&id("bad")).unwrap().state.set(state::INVALID, true);

        recalculate(&mut pins, &id("home"));
        // "bad" is marked reachable as a direct neighbor of home...
        assert!(pins[&id("bad")].state.has(state::REACHABLE));
        // ...but does not propagate further to "far".
        assert!(!pins[&id("far")].state.has(state::REACHABLE));
    }

    #[test]
    fn shorter_path_wins_monotonicity() {
        // B.HopDistance <= A.HopDistance + 1.
        let mut pins = HashMap::new();
        for n in ["home", "a", "b", "c"] {
            pins.insert(id(n), Pin::new(id(n)));
        }
        link(&mut pins, "home", "a");
        link(&mut pins, "a", "c");
        link(&mut pins, "home", "b");
        link(&mut pins, "b", "c");
        recalculate(&mut pins, &id("home"));
        let dist_a = pins[&id("a")].hop_distance.unwrap();
        let dist_c = pins[&id("c")].hop_distance.unwrap();
        assert!(dist_c <= dist_a + 1);
    }
}
