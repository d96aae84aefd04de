//! Per-map periodic task scheduler.
//! Grounded on the prior `CancellationToken`-gated sync loops
//! (`chain/client/src/sync/state/mod.rs`): every worker receives a token and returns at its
//! next loop head on cancellation, without flushing whatever it left dirty.

use crate::broadcast::Broadcaster;
use crate::map::graph::Map;
use crate::map::failing;
use crate::measure::{self, Prober};
use crate::store::Store;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lane/obsolescence sweep: every 1 hour, starting 3 minutes after start.
const OBSOLESCENCE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const OBSOLESCENCE_START_DELAY: Duration = Duration::from_secs(3 * 60);

/// Failing-state sweep: every 1 minute, starting 3 minutes after start.
const FAILING_INTERVAL: Duration = Duration::from_secs(60);
const FAILING_START_DELAY: Duration = Duration::from_secs(3 * 60);

/// Measurement driver (public nodes only): every 1 minute, starting 5 minutes after start.
const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(60);
const MEASUREMENT_START_DELAY: Duration = Duration::from_secs(5 * 60);

/// Removes Hubs that Intel has marked discontinued, or that have gone obsolete: offline or invalid
/// past an obsolescence window and with no active session. Runs alongside lane pruning since both
/// only matter once an hour and both mutate the same Pin set.
#[tracing::instrument(target = "spn::worker", level = "debug", skip_all, fields(map = %map.name))]
pub fn obsolescence_sweep(map: &Map, store: Option<&Store>, broadcaster: &Broadcaster, now_millis: i64) {
    let intel = map.intel();
    let stale: Vec<crate::hub::HubId> = {
        let r = map.read();
        r.hubs
            .iter()
            .filter(|(id, hub)| intel.is_discontinued(id) || hub.is_obsolete(now_millis))
            .map(|(id, _)| id.clone())
            .collect()
    };

    let removed_any = !stale.is_empty();
    for id in stale {
        let export = { map.read().all.get(&id).map(|p| p.export(true, None)) };
        map.remove_hub(&id);
        if map.remove_pin(&id).is_some() {
            drain_peer_references(map, &id);
        }
        if let Some(store) = store {
            if let Err(err) = store.delete_hub(&map.name, &id) {
                tracing::warn!(target: "spn::worker", hub = %id, %err, "failed to delete obsolete hub from storage");
            }
        }
        if let Some(export) = export {
            broadcaster.notify_deleted(export);
        }
    }

    if removed_any {
        recalculate_reachability(map);
    }
}

fn recalculate_reachability(map: &Map) {
    if let Some(home) = map.home() {
        let mut w = map.write();
        crate::map::reachability::recalculate(&mut w.all, &home);
    }
}

/// A removed Pin must have all references drained from its peers before its map entry is
/// deleted.
fn drain_peer_references(map: &Map, removed: &crate::hub::HubId) {
    let mut w = map.write();
    for pin in w.all.values_mut() {
        pin.connected_to.remove(removed);
    }
}

/// Spawns the four periodic workers for `map` on the current Tokio runtime, returning a
/// `CancellationToken` the caller drops/cancels at shutdown. `measurements_enabled` gates the
/// measurement driver.
pub fn spawn(
    map: Arc<Map>,
    store: Option<Arc<Store>>,
    broadcaster: Arc<Broadcaster>,
    prober: Option<Arc<dyn Prober>>,
    measurements_enabled: bool,
    clock: crate::clock::SharedClock,
) -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let map = map.clone();
        let store = store.clone();
        let broadcaster = broadcaster.clone();
        let clock = clock.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + OBSOLESCENCE_START_DELAY, OBSOLESCENCE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        obsolescence_sweep(&map, store.as_deref(), &broadcaster, clock.now_millis());
                    }
                }
            }
        });
    }

    {
        let map = map.clone();
        let clock = clock.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + FAILING_START_DELAY, FAILING_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        failing::sweep(&map, clock.now_millis());
                    }
                }
            }
        });
    }

    if measurements_enabled {
        if let Some(prober) = prober {
            let map = map.clone();
            let clock = clock.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + MEASUREMENT_START_DELAY, MEASUREMENT_INTERVAL);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = ticker.tick() => {
                            let outcome = measure::run_pass(&map, prober.as_ref(), clock.now_millis()).await;
                            tracing::debug!(target: "spn::worker", map = %map.name, ?outcome, "measurement pass complete");
                        }
                    }
                }
            });
        }
    }

    cancel
}
