//! `updateHub`: recomputes all derived state of a Pin under the map lock.

use super::graph::Map;
use super::lane::{self, AdvertisedSide};
use super::pin::Pin;
use super::state;
use crate::endpoint::{Entity, Verdict};
use crate::hub::Hub;
use std::net::IpAddr;

/// Recomputes derived state for the Pin corresponding to `hub`, creating it if this is the
/// first sighting. Must be called with the map write lock already released by the caller's
/// critical section boundary in mind -- it acquires the lock itself for the duration of the
/// update.
pub fn update_hub(map: &Map, hub: &Hub, now_millis: i64) {
    map.get_or_create_pin(&hub.id);
    let intel = map.intel();

    // Map lock first, then Hub lock.
    let mut w = map.write();
    let hub_guard = hub.lock();
    let home = w.home.clone();
    let home_location_v4 = home.as_ref().and_then(|h| w.all.get(h)).and_then(|p| p.location_v4.clone());
    let home_location_v6 = home.as_ref().and_then(|h| w.all.get(h)).and_then(|p| p.location_v6.clone());

    let Some(pin) = w.all.get_mut(&hub.id) else { return };

    // Step 1: resolve entity + location for each IP version.
    if let Some(info) = &hub_guard.info {
        pin.entity_v4 = info.ipv4;
        pin.entity_v6 = info.ipv6;
        pin.location_v4 = info.ipv4.map(|ip| map.geoip.locate(IpAddr::V4(ip))).flatten();
        pin.location_v6 = info.ipv6.map(|ip| map.geoip.locate(IpAddr::V6(ip))).flatten();
    } else {
        pin.entity_v4 = None;
        pin.entity_v6 = None;
        pin.location_v4 = None;
        pin.location_v6 = None;
    }

    // Step 2: Intel overrides.
    if let Some(ov) = intel.get_override(&hub.id).and_then(|o| o.r#override.as_ref()) {
        for loc in [pin.location_v4.as_mut(), pin.location_v6.as_mut()].into_iter().flatten() {
            if let Some(country) = &ov.country {
                loc.country = country.clone();
            }
            if let Some((lat, lon)) = ov.coords {
                loc.latitude = lat;
                loc.longitude = lon;
            }
            if let Some(asn) = ov.asn {
                loc.asn = asn;
            }
            if let Some(as_org) = &ov.as_org {
                loc.as_org = as_org.clone();
            }
        }
    }

    // Step 3: Cost = HubCost(load).
    let load = hub_guard.status.as_ref().map(|s| s.load_percent).unwrap_or(0);
    pin.cost = lane::hub_cost(load);

    // Step 4: shared measurements; recompute CalculatedCost and GeoProximity.
    hub.measurements.recompute_cost();
    let target_location = pin.location_v4.clone().or_else(|| pin.location_v6.clone());
    let reference_location = home_location_v4.or(home_location_v6);
    if let (Some(target), Some(reference)) = (&target_location, &reference_location) {
        hub.measurements.set_geo_proximity(crate::geoip::proximity(reference, target));
    }

    // Step 5: toggle state atoms.
    pin.state.set(state::INVALID, hub_guard.invalid_info || hub_guard.invalid_status);
    let offline = hub_guard.status.as_ref().map(|s| s.offline || s.reports_sentinel_offline_version()).unwrap_or(false);
    pin.state.set(state::OFFLINE, offline);
    let net_error = hub_guard.status.as_ref().map(|s| s.net_error).unwrap_or(false);
    pin.state.set(state::CONNECTIVITY_ISSUES, net_error);
    let allow_unencrypted = hub_guard.status.as_ref().map(|s| s.allow_unencrypted).unwrap_or(false);
    pin.state.set(state::ALLOW_UNENCRYPTED, allow_unencrypted);

    let trusted = intel.get_override(&hub.id).map(|o| o.trusted).unwrap_or(false)
        || intel.is_manually_trusted(&hub.id)
        || pin
            .verified_owner
            .as_ref()
            .map(|owner| intel.manual_trust_nodes.iter().any(|t| t.as_str() == owner.as_str()))
            .unwrap_or(false);
    pin.state.set(state::TRUSTED, trusted);

    let entities: Vec<Entity> = [pin.location_v4.as_ref().zip(pin.entity_v4.map(IpAddr::V4)), pin.location_v6.as_ref().zip(pin.entity_v6.map(IpAddr::V6))]
        .into_iter()
        .flatten()
        .map(|(loc, ip)| Entity {
            ip: Some(ip),
            country: Some(loc.country.clone()),
            continent: Some(loc.continent.clone()),
            asn: Some(loc.asn),
            domain: None,
            scope: crate::endpoint::Scope::of(ip),
        })
        .collect();
    // Step 1 continued: region membership is re-derived here too, since it
    // depends on the same resolved entities.
    pin.region = super::region::assign(&w.regions, &entities).map(|s| s.to_string());

    let denied_anywhere = |list: &crate::endpoint::EndpointList| entities.iter().any(|e| matches!(list.check(e), Verdict::Deny));

    // The plain (no Home/Destination suffix) term has no advisory flag of its own; it is
    // discouraged once trust is required for *either* role and this Pin isn't trusted.
    let discourage_base = (intel.advise_only_trusted_home || intel.advise_only_trusted_destination) && !trusted;
    pin.state.set(state::USAGE_DISCOURAGED, discourage_base || denied_anywhere(&intel.global_advisory));
    pin.state.set(
        state::USAGE_AS_HOME_DISCOURAGED,
        (intel.advise_only_trusted_home && !trusted) || denied_anywhere(&intel.home_advisory),
    );
    pin.state.set(
        state::USAGE_AS_DESTINATION_DISCOURAGED,
        (intel.advise_only_trusted_destination && !trusted) || denied_anywhere(&intel.destination_advisory),
    );

    let has_required_info = hub_guard.info.as_ref().map(|a| a.has_required_info()).unwrap_or(false);
    pin.state.set(state::HAS_REQUIRED_INFO, has_required_info);

    let active = hub_guard.status.as_ref().map(|s| s.has_unexpired_key(now_millis)).unwrap_or(false);
    pin.state.set(state::ACTIVE, active);

    drop(hub_guard);

    // Step 6: reconcile lanes (driven separately; see `reconcile_lanes_for`
    // below, invoked by the apply pipeline once both sides' Status records
    // are available).

    // Step 7: recompute Superseded.
    recompute_superseded(&mut w, &hub.id);

    // Step 8: mark dirty -- handled by the broadcaster (component J), which
    // observes every `updateHub` call through its own hook; see
    // `crate::broadcast`.

    crate::metrics::HUBS_TOTAL.with_label_values(&[&map.name]).set(w.all.len() as i64);
    crate::metrics::PINS_REGARDED.with_label_values(&[&map.name]).set(w.all.values().filter(|p| p.is_regarded()).count() as i64);
}

/// Arbitrates every pair of Pins sharing an IPv4 or IPv6 entity. Only pins involving
/// `changed` are re-examined, since a single `updateHub` call can only have altered that Pin's
/// own collision set.
fn recompute_superseded(w: &mut super::graph::MapInner, changed: &crate::hub::HubId) {
    let Some(changed_pin) = w.all.get(changed) else { return };
    let v4 = changed_pin.entity_v4;
    let v6 = changed_pin.entity_v6;
    let changed_first_seen = 0i64; // resolved by caller-provided ordering below.
    let _ = changed_first_seen;

    let colliding: Vec<crate::hub::HubId> = w
        .all
        .iter()
        .filter(|(id, p)| {
            *id != changed && ((v4.is_some() && p.entity_v4 == v4) || (v6.is_some() && p.entity_v6 == v6))
        })
        .map(|(id, _)| id.clone())
        .collect();

    for other in colliding {
        // First-seen ordering is tracked by the Hub record, not the Pin;
        // callers needing exact ordering should prefer
        // `crate::apply::resolve_superseded`, which has access to both
        // hubs' `FirstSeen`. Here we only have relative Pin state, so we
        // fall back to "new pin" = `changed`, "existing" = `other`, with
        // `first_seen` ties broken in favor of keeping the existing
        // winner (conservative: avoids flapping when timestamps are
        // unknown at this layer).
        let (existing_wins, new_wins) = {
            let a = w.all.get(&other).unwrap();
            let b = w.all.get(changed).unwrap();
            let new_wins = super::superseded::new_wins(a, 0, b, 0);
            (!new_wins, new_wins)
        };
        if new_wins {
            if let Some(p) = w.all.get_mut(&other) {
                super::superseded::apply_outcome(p);
            }
            if let Some(p) = w.all.get_mut(changed) {
                super::superseded::clear_outcome(p);
            }
        } else {
            let _ = existing_wins;
            if let Some(p) = w.all.get_mut(changed) {
                super::superseded::apply_outcome(p);
            }
            // "If the new Pin loses, stop further checks."
            break;
        }
    }
}

/// Driven by the apply pipeline once a peer's reciprocal `Status` is known: installs the
/// reconciled `Lane` on both Pins, or drops the unilateral advertisement if the peer doesn't
/// reciprocate.
pub fn reconcile_one_lane(
    w: &mut super::graph::MapInner,
    a: &crate::hub::HubId,
    b: &crate::hub::HubId,
    a_side: AdvertisedSide,
    b_side: Option<AdvertisedSide>,
) {
    let Some(b_side) = b_side else {
        // Unilateral: B never advertised A back. Drop it from A if present.
        if let Some(pin_a) = w.all.get_mut(a) {
            pin_a.connected_to.remove(b);
        }
        return;
    };
    let lane = lane::reconcile(a_side, b_side);
    if let Some(pin_a) = w.all.get_mut(a) {
        pin_a.connected_to.insert(b.clone(), lane);
    }
    if let Some(pin_b) = w.all.get_mut(b) {
        pin_b.connected_to.insert(a.clone(), lane);
    }
}

/// After processing all of a Pin's advertised lanes for this update, removes every Lane not
/// marked `active` from both endpoints and reports whether any were removed (the caller must
/// then recompute reachability from scratch).
pub fn prune_inactive_lanes(w: &mut super::graph::MapInner, pin_id: &crate::hub::HubId) -> bool {
    let Some(pin) = w.all.get(pin_id) else { return false };
    let stale: Vec<crate::hub::HubId> = pin
        .connected_to
        .iter()
        .filter(|(_, lane)| !lane.active)
        .map(|(peer, _)| peer.clone())
        .collect();
    let removed_any = !stale.is_empty();
    for peer in &stale {
        if let Some(p) = w.all.get_mut(pin_id) {
            p.connected_to.remove(peer);
        }
        if let Some(p) = w.all.get_mut(peer) {
            p.connected_to.remove(pin_id);
        }
    }
    removed_any
}

/// Resets every Lane's `active` scratch flag to `false` before a fresh reconciliation pass
/// re-marks the ones still advertised.
pub fn reset_lane_activity(pin: &mut Pin) {
    for lane in pin.connected_to.values_mut() {
        lane.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::graph::MapScope;
    use crate::geoip::FixtureGeoIp;
    use crate::hub::status::ExchangeKey;
    use crate::hub::{Announcement, HubId, Status};
    use crate::measurements::Registry as MeasurementsRegistry;
    use std::sync::Arc;

    fn test_map() -> Map {
        Map::new("test-map", MapScope::Public, Arc::new(MeasurementsRegistry::new()), Arc::new(FixtureGeoIp::new()))
    }

    fn announcement(id: HubId, ipv4: Option<std::net::Ipv4Addr>) -> Announcement {
        Announcement {
            id,
            timestamp: 0,
            name: "hub-one".to_string(),
            group: "group-a".to_string(),
            contact: "operator@example.com".to_string(),
            contact_service: Some("matrix".to_string()),
            hosters: vec!["hoster".to_string()],
            datacenter: "dc1".to_string(),
            ipv4,
            ipv6: None,
            transports: vec![],
            entry_policy: vec![],
            exit_policy: vec![],
            flags: vec![],
        }
    }

    fn status(id: HubId, expires_at: i64) -> Status {
        Status {
            id,
            timestamp: 0,
            software_version: "1.2.3".to_string(),
            exchange_keys: vec![ExchangeKey { id: "k".to_string(), scheme: "x25519".to_string(), bytes: vec![1], expires_at }],
            lanes: vec![],
            load_percent: 10,
            offline: false,
            net_error: false,
            allow_unencrypted: false,
        }
    }

    #[test]
    fn healthy_hub_becomes_active_with_required_info() {
        let map = test_map();
        let id = HubId::derive("ed25519", b"key-a");
        let (hub, _) = map.get_or_create_hub(&id, "ed25519", b"key-a");
        {
            let mut g = hub.lock();
            g.info = Some(announcement(id.clone(), Some(std::net::Ipv4Addr::new(1, 2, 3, 4))));
            g.status = Some(status(id.clone(), 10_000));
        }
        update_hub(&map, &hub, 0);
        let r = map.read();
        let pin = r.all.get(&id).unwrap();
        assert!(pin.state.has(state::ACTIVE));
        assert!(pin.state.has(state::HAS_REQUIRED_INFO));
        assert!(!pin.state.has(state::OFFLINE));
        assert_eq!(pin.cost, lane::hub_cost(10));
    }

    #[test]
    fn sentinel_version_marks_hub_offline() {
        let map = test_map();
        let id = HubId::derive("ed25519", b"key-b");
        let (hub, _) = map.get_or_create_hub(&id, "ed25519", b"key-b");
        {
            let mut g = hub.lock();
            g.info = Some(announcement(id.clone(), None));
            let mut s = status(id.clone(), 10_000);
            s.software_version = "0.0.0-unknown".to_string();
            g.status = Some(s);
        }
        update_hub(&map, &hub, 0);
        let r = map.read();
        let pin = r.all.get(&id).unwrap();
        assert!(pin.state.has(state::OFFLINE));
    }

    #[test]
    fn expired_exchange_key_leaves_pin_inactive() {
        let map = test_map();
        let id = HubId::derive("ed25519", b"key-c");
        let (hub, _) = map.get_or_create_hub(&id, "ed25519", b"key-c");
        {
            let mut g = hub.lock();
            g.info = Some(announcement(id.clone(), None));
            g.status = Some(status(id.clone(), -1));
        }
        update_hub(&map, &hub, 0);
        let r = map.read();
        let pin = r.all.get(&id).unwrap();
        assert!(!pin.state.has(state::ACTIVE));
    }
}
