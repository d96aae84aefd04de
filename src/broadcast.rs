//! Component J: change broadcaster.
//! Every Pin carries a one-shot dirty flag (tracked here rather than on `Pin` itself, since the
//! flag's only consumer is the flush below and keeping it out of `Pin` avoids yet another field
//! every map-lock critical section has to touch). On mutation the caller marks a Pin dirty; a
//! coalesced flush exports each dirty Pin and pushes it onto a subscription bus. Grounded on
//! the prior `broadcast::Sender<>` fan-out in `client_actor.rs`, generalized here from a unit
//! "something changed" signal into a typed export stream, since subscribers need the changed
//! Pin's content, not just a wakeup.

use crate::hub::HubId;
use crate::map::graph::Map;
use crate::map::pin::PinExport;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Default channel depth; a slow subscriber that falls behind this many exports starts missing
/// them.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum Change {
    Updated(PinExport),
    Deleted(PinExport),
}

/// Tracks which Hub IDs are dirty since the last flush and fans out `Change`s to subscribers.
/// One instance per `Map`.
pub struct Broadcaster {
    dirty: Mutex<HashSet<HubId>>,
    tx: broadcast::Sender<Change>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { dirty: Mutex::new(HashSet::new()), tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    /// Marks a Pin dirty; called by every map mutation site (`update_hub`, lane reconciliation,
    /// superseded arbitration, failing-state sweep).
    pub fn mark_dirty(&self, id: &HubId) {
        self.dirty.lock().insert(id.clone());
    }

    /// Coalesced flush: exports every dirty Pin (including a path to home when connected) and
    /// pushes it on the bus. Non-fatal if nobody's listening -- `broadcast::Sender::send` only
    /// errors when there are zero receivers, which just means the dirty flag is dropped and
    /// resynchronization is eventual.
    #[tracing::instrument(target = "spn::broadcast", level = "trace", skip_all, fields(map = %map.name))]
    pub fn flush(&self, map: &Map) {
        let dirty: Vec<HubId> = std::mem::take(&mut *self.dirty.lock()).into_iter().collect();
        if dirty.is_empty() {
            return;
        }
        let r = map.read();
        for id in dirty {
            let Some(pin) = r.all.get(&id) else { continue };
            let path = path_to_home(&r, &id);
            let export = pin.export(false, path);
            let _ = self.tx.send(Change::Updated(export));
        }
    }

    /// Pushes a `deleted`-marked export for a Pin that's about to be removed from the map.
    pub fn notify_deleted(&self, export: PinExport) {
        self.dirty.lock().remove(&export.hub_id);
        let mut export = export;
        export.deleted = true;
        let _ = self.tx.send(Change::Deleted(export));
    }
}

/// Walks back from `id` to `home` via each Pin's lowest-cost lane, following strictly
/// decreasing `HopDistance`, for the `PinExport.path_to_home` field.
fn path_to_home(r: &crate::map::graph::MapInner, id: &HubId) -> Option<Vec<HubId>> {
    let home = r.home.clone()?;
    if *id == home {
        return Some(vec![home]);
    }
    let mut path = vec![id.clone()];
    let mut current = id.clone();
    let mut guard = 0usize;
    loop {
        guard += 1;
        if guard > r.all.len() + 1 {
            return None; // cycle guard; topology is inconsistent mid-update.
        }
        let current_dist = r.all.get(&current)?.hop_distance?;
        let next = r.all[&current]
            .connected_to
            .iter()
            .filter(|(peer, _)| r.all.get(*peer).and_then(|p| p.hop_distance).map(|d| d < current_dist).unwrap_or(false))
            .min_by(|(_, a), (_, b)| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(peer, _)| peer.clone())?;
        path.push(next.clone());
        if next == home {
            path.reverse();
            return Some(path);
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::FixtureGeoIp;
    use crate::map::graph::MapScope;
    use crate::map::lane::Lane;
    use crate::measurements::Registry;
    use std::sync::Arc;

    fn id(s: &str) -> HubId {
        HubId::from(s.to_string())
    }

    fn test_map() -> Map {
        Map::new("test", MapScope::Public, Arc::new(Registry::new()), Arc::new(FixtureGeoIp::new()))
    }

    #[test]
    fn flush_exports_only_dirty_pins() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        map.get_or_create_pin(&id("a"));
        map.get_or_create_pin(&id("b"));

        let b = Broadcaster::default();
        let mut rx = b.subscribe();
        b.mark_dirty(&id("a"));
        b.flush(&map);

        let change = rx.try_recv().unwrap();
        match change {
            Change::Updated(export) => assert_eq!(export.hub_id, id("a")),
            _ => panic!("expected an update"),
        }
        assert!(rx.try_recv().is_err(), "only the dirty pin should have been flushed");
    }

    #[test]
    fn empty_dirty_set_flushes_nothing() {
        let map = test_map();
        let b = Broadcaster::default();
        let mut rx = b.subscribe();
        b.flush(&map);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn deleted_pin_is_marked_in_export() {
        let map = test_map();
        map.get_or_create_pin(&id("a"));
        let b = Broadcaster::default();
        let mut rx = b.subscribe();
        let export = map.read().all[&id("a")].export(false, None);
        b.notify_deleted(export);
        match rx.try_recv().unwrap() {
            Change::Deleted(e) => assert!(e.deleted),
            _ => panic!("expected a deletion"),
        }
    }

    #[test]
    fn path_to_home_follows_cheapest_lane() {
        let map = test_map();
        map.set_home(id("home"));
        map.get_or_create_pin(&id("home"));
        map.get_or_create_pin(&id("a"));
        {
            let mut w = map.write();
            w.all.get_mut(&id("home")).unwrap().hop_distance = Some(1);
            w.all.get_mut(&id("a")).unwrap().hop_distance = Some(2);
            let lane = Lane::new(100_000_000, 10_000_000);
            w.all.get_mut(&id("home")).unwrap().connected_to.insert(id("a"), lane);
            w.all.get_mut(&id("a")).unwrap().connected_to.insert(id("home"), lane);
        }
        let r = map.read();
        let path = path_to_home(&r, &id("a")).unwrap();
        assert_eq!(path, vec![id("home"), id("a")]);
    }
}
