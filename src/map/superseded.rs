//! Superseded arbitration.

use super::pin::Pin;
use super::state;

/// Decision order: Active wins, else Reachable wins, else later FirstSeen wins, else the
/// existing Pin wins. Returns `true` if `new` should win (existing Pin loses and gets
/// `Superseded`); `false` if `existing` should win (new Pin loses).
/// If the new Pin loses, the caller must stop checking further pairs for it to prevent
/// inconsistency -- that early-stop is the caller's responsibility once this returns `false`.
pub fn new_wins(existing: &Pin, existing_first_seen_millis: i64, new: &Pin, new_first_seen_millis: i64) -> bool {
    let existing_active = existing.state.has(state::ACTIVE);
    let new_active = new.state.has(state::ACTIVE);
    if existing_active != new_active {
        return new_active;
    }
    let existing_reachable = existing.state.has(state::REACHABLE);
    let new_reachable = new.state.has(state::REACHABLE);
    if existing_reachable != new_reachable {
        return new_reachable;
    }
    if existing_first_seen_millis != new_first_seen_millis {
        return new_first_seen_millis > existing_first_seen_millis;
    }
    false
}

pub fn apply_outcome(loser: &mut Pin) {
    loser.state.set(state::SUPERSEDED, true);
}

pub fn clear_outcome(winner: &mut Pin) {
    winner.state.set(state::SUPERSEDED, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubId;

    fn pin(active: bool, reachable: bool) -> Pin {
        let mut p = Pin::new(HubId::from("x".to_string()));
        p.state.set(state::ACTIVE, active);
        p.state.set(state::REACHABLE, reachable);
        p
    }

    #[test]
    fn active_beats_everything() {
        let existing = pin(true, false);
        let new = pin(false, true);
        assert!(!new_wins(&existing, 1, &new, 2));
    }

    #[test]
    fn reachable_breaks_tie_when_neither_active() {
        let existing = pin(false, false);
        let new = pin(false, true);
        assert!(new_wins(&existing, 1, &new, 2));
    }

    #[test]
    fn first_seen_breaks_remaining_tie() {
        let existing = pin(false, false);
        let new = pin(false, false);
        assert!(new_wins(&existing, 1, &new, 5));
        assert!(!new_wins(&existing, 5, &new, 1));
    }

    #[test]
    fn split_horizon_promotion_scenario() {
        // split-horizon promotion scenario.
        let p1 = pin(true, false); // Active, first-seen=t
        let p2 = pin(false, false); // not Active, first-seen=t+1
        assert!(!new_wins(&p1, 0, &p2, 1), "P1 active, keeps winning over later P2");

        // Expire P1's keys: no longer active; re-apply P2 status so it becomes active.
        let p1_after = pin(false, false);
        let p2_after = pin(true, false);
        assert!(new_wins(&p1_after, 0, &p2_after, 1), "P2 now active, supersedes P1");
    }
}
