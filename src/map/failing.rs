//! Failing-state handling.

use super::graph::Map;
use super::state;
use crate::hub::HubId;

/// `MarkAsFailingFor(duration)`: sets `FailingUntil = max(now+duration, prev)` and adds
/// `StateFailing`.
pub fn mark_as_failing_for(map: &Map, id: &HubId, now_millis: i64, duration_millis: i64) {
    let mut w = map.write();
    let Some(pin) = w.all.get_mut(id) else { return };
    let candidate = now_millis + duration_millis;
    pin.failing_until_millis = Some(pin.failing_until_millis.map(|prev| prev.max(candidate)).unwrap_or(candidate));
    pin.state.set(state::FAILING, true);
}

/// The periodic 1-minute worker: clears `StateFailing` once `now >= FailingUntil`.
pub fn sweep(map: &Map, now_millis: i64) {
    let mut w = map.write();
    for pin in w.all.values_mut() {
        if pin.state.has(state::FAILING) {
            if let Some(until) = pin.failing_until_millis {
                if now_millis >= until {
                    pin.state.set(state::FAILING, false);
                }
            }
        }
    }
}
