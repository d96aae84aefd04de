//! Component E: the announcement/status apply pipeline.
//! `apply_announcement` and `apply_status` are the only entry points that mutate a `Hub`'s
//! signed records; both route through `map::update::update_hub` once the record itself is
//! accepted so that derived Pin state stays in lock-step with what was just stored. Grounded on
//! the prior `store::Store` instrumentation conventions (`#[tracing::instrument]` on every
//! entry point that mutates durable state) applied to a multi-step pipeline instead of a single
//! DB write.

pub mod error;

pub use error::Error;

use crate::broadcast::Broadcaster;
use crate::endpoint::Scope;
use crate::hub::announcement::Announcement;
use crate::hub::crypto::Verify;
use crate::hub::envelope::{self, Envelope};
use crate::hub::status::Status;
use crate::hub::validate::validate_formatting;
use crate::hub::Hub;
use crate::map::graph::{Map, MapScope};
use crate::map::lane::AdvertisedSide;
use crate::map::{reachability, update};

/// Outcome of successfully applying an update. Distinguished so callers (the broadcaster,
/// metrics) know whether to gossip the record onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record was accepted and is fully valid.
    Accepted,
    /// The record's timestamp equaled the stored one; nothing changed.
    NoOp,
    /// The record failed validation but, because the Hub was already known, was stored anyway
    /// with an invalid flag set.
    SoftFailed,
}

fn check_scope(announcement: &Announcement, scope: MapScope) -> Result<(), Error> {
    let want: fn(Scope) -> bool = match scope {
        MapScope::Local => |s: Scope| matches!(s, Scope::Lan | Scope::Loopback),
        MapScope::Public => |s: Scope| matches!(s, Scope::Internet),
    };
    if let Some(ip) = announcement.ipv4 {
        if !want(Scope::of(std::net::IpAddr::V4(ip))) {
            return Err(Error::ScopeMismatch);
        }
    }
    if let Some(ip) = announcement.ipv6 {
        if !want(Scope::of(std::net::IpAddr::V6(ip))) {
            return Err(Error::ScopeMismatch);
        }
    }
    Ok(())
}

/// Applies a newly received announcement: verify -> version-check -> format-validate ->
/// soft-fail-apply -> update state/lanes -> recompute reachability.
/// `self_check` skips the Hub lock, used when a node is validating its own pending announcement
/// before signing and publishing it.
#[tracing::instrument(target = "spn::apply", level = "debug", skip_all, fields(map = %map.name))]
pub fn apply_announcement(
    map: &Map,
    envelope: &Envelope,
    verifier: &dyn Verify,
    now_millis: i64,
    self_check: bool,
    broadcaster: Option<&Broadcaster>,
) -> Result<Applied, Error> {
    let known = map.get_hub(&envelope.signer_id);
    let known_key: Option<(String, Vec<u8>)> = known.as_ref().map(|h| (h.scheme.clone(), h.public_key.clone()));
    let opened = envelope::open(
        envelope,
        known_key.as_ref().map(|(s, k)| (s.as_str(), k.as_slice())),
        /* tofu_allowed = */ true,
        verifier,
    )?;

    let announcement: Announcement = serde_json::from_value(opened.payload).map_err(|e| Error::Decode(e.to_string()))?;
    if announcement.id != opened.signer_id {
        return Err(Error::IdMismatch);
    }

    let (scheme, pubkey) = match (&known_key, &opened.learned_key) {
        (Some((s, k)), _) => (s.clone(), k.clone()),
        (None, Some(tofu)) => (tofu.scheme.clone(), tofu.pubkey.clone()),
        (None, None) => unreachable!("open() guarantees a key on success"),
    };
    let (hub, _created) = map.get_or_create_hub(&opened.signer_id, &scheme, &pubkey);

    // `self_check` (validating one's own pending announcement before
    // publishing it) needs no special locking discipline here: the lock is
    // never already held by this call path, unlike the Go original's
    // goroutine-local re-entrancy concern.
    let _ = self_check;
    let mut guard = hub.lock();

    let old_info = guard.info.clone();
    let was_first_sight = old_info.is_none();

    if let Some(old) = &old_info {
        if announcement.timestamp < old.timestamp {
            return Err(Error::OldData);
        }
        if announcement.timestamp == old.timestamp {
            return Ok(Applied::NoOp);
        }
    }

    // Optimistically move the stored timestamp forward before deeper
    // validation, so an invalid update still advances the clock and is
    // gossiped onward.
    guard.info = Some(announcement.clone());

    let mut reason: Option<Error> = None;
    if let Err(e) = validate_formatting(&announcement, &pubkey) {
        reason = Some(e.into());
    }
    if reason.is_none() && announcement.parsed_transports().is_empty() {
        reason = Some(Error::MissingTransports);
    }
    if reason.is_none() && !announcement.within_clock_skew(now_millis) {
        reason = Some(Error::FutureTimestamp);
    }

    let mut clear_verified_ips = false;
    if let Some(old) = &old_info {
        if guard.verified_ips {
            let v4_changed = old.ipv4.is_some() && old.ipv4 != announcement.ipv4;
            let v6_changed = old.ipv6.is_some() && old.ipv6 != announcement.ipv6;
            if v4_changed || v6_changed {
                reason = reason.or(Some(Error::ImmutableIpChanged));
                clear_verified_ips = true;
            }
        }
        if old.ipv4.is_none() && announcement.ipv4.is_some() {
            clear_verified_ips = true;
        }
        if old.ipv6.is_none() && announcement.ipv6.is_some() {
            clear_verified_ips = true;
        }
    }

    if reason.is_none() {
        if let Err(e) = check_scope(&announcement, map.scope) {
            reason = Some(e);
        }
    }

    if let Some(reason) = reason {
        if was_first_sight {
            // Hard-fail: nothing was ever valid for this Hub, so don't
            // leave a half-applied record behind.
            guard.info = old_info;
            if _created {
                drop(guard);
                map.remove_hub(&opened.signer_id);
            }
            crate::metrics::ANNOUNCEMENTS_APPLIED.with_label_values(&[&map.name, "rejected"]).inc();
            return Err(reason);
        }
        guard.invalid_info = true;
        if clear_verified_ips {
            guard.verified_ips = false;
        }
        tracing::debug!(target: "spn::apply", hub = %hub.id, %reason, "announcement soft-failed, keeping update");
        drop(guard);
        update::update_hub(map, &hub, now_millis);
        if let Some(b) = broadcaster {
            b.mark_dirty(&hub.id);
        }
        crate::metrics::ANNOUNCEMENTS_APPLIED.with_label_values(&[&map.name, "soft_failed"]).inc();
        return Ok(Applied::SoftFailed);
    }

    guard.invalid_info = false;
    if clear_verified_ips {
        guard.verified_ips = false;
    }
    if guard.first_seen_millis == 0 {
        guard.first_seen_millis = now_millis;
    }
    drop(guard);

    update::update_hub(map, &hub, now_millis);
    if let Some(b) = broadcaster {
        b.mark_dirty(&hub.id);
    }
    crate::metrics::ANNOUNCEMENTS_APPLIED.with_label_values(&[&map.name, "accepted"]).inc();
    Ok(Applied::Accepted)
}

/// Applies a newly received status: analogous to `apply_announcement`, but does not permit
/// TOFU, does not check IP immutability, and sets `InvalidStatus` on soft-fail.
#[tracing::instrument(target = "spn::apply", level = "debug", skip_all, fields(map = %map.name))]
pub fn apply_status(
    map: &Map,
    envelope: &Envelope,
    verifier: &dyn Verify,
    now_millis: i64,
    self_check: bool,
    broadcaster: Option<&Broadcaster>,
) -> Result<Applied, Error> {
    let known = map.get_hub(&envelope.signer_id).ok_or(Error::UnknownHubForStatus)?;
    let known_key = (known.scheme.clone(), known.public_key.clone());
    let opened = envelope::open(envelope, Some((&known_key.0, &known_key.1)), false, verifier)?;

    let status: Status = serde_json::from_value(opened.payload).map_err(|e| Error::Decode(e.to_string()))?;
    if status.id != opened.signer_id {
        return Err(Error::IdMismatch);
    }

    let hub = known;
    let _ = self_check;
    let mut guard = hub.lock();

    let old_status = guard.status.clone();
    let was_first_sight = old_status.is_none();
    if let Some(old) = &old_status {
        if status.timestamp < old.timestamp {
            return Err(Error::OldData);
        }
        if status.timestamp == old.timestamp {
            return Ok(Applied::NoOp);
        }
    }

    guard.status = Some(status.clone());

    let mut reason: Option<Error> = None;
    if status.load_percent > 100 {
        reason = Some(Error::Decode("load_percent out of range".into()));
    }

    if let Some(reason) = reason {
        if was_first_sight {
            guard.status = old_status;
            crate::metrics::STATUSES_APPLIED.with_label_values(&[&map.name, "rejected"]).inc();
            return Err(reason);
        }
        guard.invalid_status = true;
        tracing::debug!(target: "spn::apply", hub = %hub.id, %reason, "status soft-failed, keeping update");
        drop(guard);
        update::update_hub(map, &hub, now_millis);
        if let Some(b) = broadcaster {
            b.mark_dirty(&hub.id);
        }
        crate::metrics::STATUSES_APPLIED.with_label_values(&[&map.name, "soft_failed"]).inc();
        return Ok(Applied::SoftFailed);
    }

    guard.invalid_status = false;
    if guard.first_seen_millis == 0 {
        guard.first_seen_millis = now_millis;
    }
    drop(guard);

    update::update_hub(map, &hub, now_millis);
    reconcile_advertised_lanes(map, &hub, &status);
    if let Some(b) = broadcaster {
        b.mark_dirty(&hub.id);
    }
    crate::metrics::STATUSES_APPLIED.with_label_values(&[&map.name, "accepted"]).inc();
    Ok(Applied::Accepted)
}

/// Drives lane reconciliation for every lane `hub` just advertised, against whatever the peer
/// has most recently advertised back. Locks are acquired in increasing Hub-ID order relative to
/// the map's own write lock, which is already held only for the duration of this call.
fn reconcile_advertised_lanes(map: &Map, hub: &Hub, status: &Status) {
    let mut w = map.write();
    update::reset_lane_activity(w.all.get_mut(&hub.id).expect("pin exists after update_hub"));

    for advertised in &status.lanes {
        let a_side = AdvertisedSide { capacity_bits_per_sec: advertised.capacity_bits_per_sec, latency_nanos: advertised.latency_nanos };
        let peer_id = advertised.peer_id.clone();
        let b_side = w
            .hubs
            .get(&peer_id)
            .and_then(|peer_hub| peer_hub.lock().status.clone())
            .and_then(|peer_status| {
                peer_status
                    .lanes
                    .iter()
                    .find(|l| l.peer_id == hub.id)
                    .map(|l| AdvertisedSide { capacity_bits_per_sec: l.capacity_bits_per_sec, latency_nanos: l.latency_nanos })
            });
        update::reconcile_one_lane(&mut w, &hub.id, &peer_id, a_side, b_side);
    }

    let removed_any = update::prune_inactive_lanes(&mut w, &hub.id);
    if removed_any {
        if let Some(home) = w.home.clone() {
            reachability::recalculate(&mut w.all, &home);
        }
    }
}
