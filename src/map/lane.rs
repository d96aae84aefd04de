//! `Lane` and lane reconciliation.

use crate::hub::HubId;

pub const MIN_LATENCY_CLAMP_NANOS: u64 = 10_000_000; // 10ms
pub const MAX_CAPACITY_CLAMP_BPS: u64 = 100_000_000; // 100 Mbit/s

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lane {
    pub capacity_bits_per_sec: u64,
    pub latency_nanos: u64,
    pub cost: f64,
    /// Reconciliation scratch flag: fresh lanes are marked `active = true`; anything left
    /// `false` after a reconciliation pass is dropped from both endpoints.
    pub active: bool,
}

impl Lane {
    pub fn new(capacity_bits_per_sec: u64, latency_nanos: u64) -> Self {
        let cost = lane_cost(latency_nanos, capacity_bits_per_sec);
        Self { capacity_bits_per_sec, latency_nanos, cost, active: true }
    }
}

/// `HubCost(load)`.
pub fn hub_cost(load_percent: u8) -> f64 {
    match load_percent {
        0..=79 => 100.0,
        80..=94 => 500.0,
        95..=99 => 1000.0,
        _ => 10_000.0,
    }
}

/// `LaneCost(latency, capacity)`. Latency dominates (milliseconds, scaled up) with an
/// inverse-capacity term so thin links cost more even at equal latency; both feed the route
/// finder's additive cost model.
pub fn lane_cost(latency_nanos: u64, capacity_bits_per_sec: u64) -> f64 {
    let latency_ms = latency_nanos as f64 / 1_000_000.0;
    let capacity_mbit = (capacity_bits_per_sec as f64 / 1_000_000.0).max(0.001);
    latency_ms + (1_000.0 / capacity_mbit)
}

/// One side's advertised lane to a peer, before reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct AdvertisedSide {
    pub capacity_bits_per_sec: u64,
    pub latency_nanos: u64,
}

/// Reconciles both sides' advertised lane into the agreed bidirectional `Lane`:
///
/// - latency = max(both sides), clamped to >= 10ms if exactly one side is zero
/// - capacity = min(both sides, using the nonzero one if only one reports), clamped to
///   <= 100Mbit/s if exactly one side is zero
pub fn reconcile(a: AdvertisedSide, b: AdvertisedSide) -> Lane {
    let latency = a.latency_nanos.max(b.latency_nanos);
    let latency = if (a.latency_nanos == 0) != (b.latency_nanos == 0) {
        latency.max(MIN_LATENCY_CLAMP_NANOS)
    } else {
        latency
    };

    let capacity = match (a.capacity_bits_per_sec, b.capacity_bits_per_sec) {
        (0, 0) => 0,
        (0, c) | (c, 0) => c,
        (x, y) => x.min(y),
    };
    let capacity = if (a.capacity_bits_per_sec == 0) != (b.capacity_bits_per_sec == 0) {
        capacity.min(MAX_CAPACITY_CLAMP_BPS)
    } else {
        capacity
    };

    Lane::new(capacity, latency)
}

/// One entry of an advertised (unilateral, pre-reconciliation) lane list, as carried in a
/// `Status` record.
#[derive(Debug, Clone)]
pub struct AdvertisedLaneEntry {
    pub peer_id: HubId,
    pub side: AdvertisedSide,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_cost_buckets() {
        assert_eq!(hub_cost(10), 100.0);
        assert_eq!(hub_cost(85), 500.0);
        assert_eq!(hub_cost(97), 1000.0);
        assert_eq!(hub_cost(100), 10_000.0);
    }

    #[test]
    fn reconcile_takes_max_latency_min_capacity() {
        let a = AdvertisedSide { capacity_bits_per_sec: 100_000_000, latency_nanos: 20_000_000 };
        let b = AdvertisedSide { capacity_bits_per_sec: 10_000_000, latency_nanos: 50_000_000 };
        let lane = reconcile(a, b);
        assert_eq!(lane.latency_nanos, 50_000_000);
        assert_eq!(lane.capacity_bits_per_sec, 10_000_000);
    }

    #[test]
    fn reconcile_clamps_when_one_side_is_zero() {
        let a = AdvertisedSide { capacity_bits_per_sec: 1_000_000_000, latency_nanos: 0 };
        let b = AdvertisedSide { capacity_bits_per_sec: 50_000_000, latency_nanos: 30_000_000 };
        let lane = reconcile(a, b);
        // latency: max(0, 30ms) = 30ms, but one side was zero -> clamp >= 10ms (already above).
        assert_eq!(lane.latency_nanos, 30_000_000);
        // capacity: one side zero? no, both nonzero, a=1000Mbit, b=50Mbit
        assert_eq!(lane.capacity_bits_per_sec, 50_000_000);
    }

    #[test]
    fn reconcile_clamps_latency_floor_when_one_side_zero_latency_value() {
        let a = AdvertisedSide { capacity_bits_per_sec: 10_000_000, latency_nanos: 0 };
        let b = AdvertisedSide { capacity_bits_per_sec: 10_000_000, latency_nanos: 2_000_000 };
        let lane = reconcile(a, b);
        // max(0, 2ms) = 2ms but exactly one side was zero -> clamp to >= 10ms.
        assert_eq!(lane.latency_nanos, MIN_LATENCY_CLAMP_NANOS);
    }

    #[test]
    fn reconcile_clamps_capacity_ceiling_when_one_side_zero() {
        let a = AdvertisedSide { capacity_bits_per_sec: 0, latency_nanos: 10_000_000 };
        let b = AdvertisedSide { capacity_bits_per_sec: 1_000_000_000, latency_nanos: 10_000_000 };
        let lane = reconcile(a, b);
        assert_eq!(lane.capacity_bits_per_sec, MAX_CAPACITY_CLAMP_BPS);
    }
}
