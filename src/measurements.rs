//! Component C: Measurements store. A per-Hub struct, shared by Hub ID across every `Map`
//! instance that has seen the Hub, guarded by its own lock independent of the map lock because
//! the measurement driver (component I) runs concurrently with queries.

use crate::hub::HubId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel cost used when no measurement exists yet, so unmeasured Hubs always sort last.
pub const MAX_COST: f64 = 1_000_000.0;

pub struct MeasurementsInner {
    pub latency_nanos: Option<u64>,
    pub latency_measured_at_millis: i64,
    pub capacity_bits_per_sec: Option<u64>,
    pub capacity_measured_at_millis: i64,
    pub calculated_cost: f64,
    pub geo_proximity: Option<u8>,
    dirty: bool,
}

impl Default for MeasurementsInner {
    fn default() -> Self {
        Self {
            latency_nanos: None,
            latency_measured_at_millis: 0,
            capacity_bits_per_sec: None,
            capacity_measured_at_millis: 0,
            calculated_cost: MAX_COST,
            geo_proximity: None,
            dirty: false,
        }
    }
}

/// Shared, lockable per-Hub measurement record.
pub struct Measurements(Mutex<MeasurementsInner>);

impl Default for Measurements {
    fn default() -> Self {
        Self(Mutex::new(MeasurementsInner::default()))
    }
}

impl Measurements {
    pub fn snapshot(&self) -> MeasurementsSnapshot {
        let g = self.0.lock();
        MeasurementsSnapshot {
            latency_nanos: g.latency_nanos,
            capacity_bits_per_sec: g.capacity_bits_per_sec,
            calculated_cost: g.calculated_cost,
            geo_proximity: g.geo_proximity,
            last_measured_millis: g.latency_measured_at_millis.max(g.capacity_measured_at_millis),
        }
    }

    pub fn record_latency(&self, nanos: u64, now_millis: i64) {
        let mut g = self.0.lock();
        g.latency_nanos = Some(nanos);
        g.latency_measured_at_millis = now_millis;
        g.dirty = true;
    }

    pub fn record_capacity(&self, bits_per_sec: u64, now_millis: i64) {
        let mut g = self.0.lock();
        g.capacity_bits_per_sec = Some(bits_per_sec);
        g.capacity_measured_at_millis = now_millis;
        g.dirty = true;
    }

    pub fn set_geo_proximity(&self, proximity: u8) {
        self.0.lock().geo_proximity = Some(proximity);
    }

    /// Recomputes `CalculatedCost = LaneCost(latency, capacity)`. See
    /// `crate::map::lane::lane_cost`.
    pub fn recompute_cost(&self) {
        let mut g = self.0.lock();
        g.calculated_cost = match (g.latency_nanos, g.capacity_bits_per_sec) {
            (Some(lat), Some(cap)) => crate::map::lane::lane_cost(lat, cap),
            _ => MAX_COST,
        };
        g.dirty = true;
    }

    pub fn mark_dirty(&self) {
        self.0.lock().dirty = true;
    }

    pub fn take_dirty(&self) -> bool {
        let mut g = self.0.lock();
        std::mem::replace(&mut g.dirty, false)
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MeasurementsSnapshot {
    pub latency_nanos: Option<u64>,
    pub capacity_bits_per_sec: Option<u64>,
    pub calculated_cost: f64,
    pub geo_proximity: Option<u8>,
    /// The more recent of the latency/capacity measurement timestamps, used by the measurement
    /// driver's TTL gate.
    pub last_measured_millis: i64,
}

/// Process-wide registry handing out the singleton `Measurements` for a given Hub ID, so two
/// `Map`s that both see the same Hub share one physical struct.
#[derive(Default)]
pub struct Registry(RwLock<HashMap<HubId, Arc<Measurements>>>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &HubId) -> Arc<Measurements> {
        if let Some(existing) = self.0.read().get(id) {
            return existing.clone();
        }
        let mut w = self.0.write();
        w.entry(id.clone()).or_insert_with(|| Arc::new(Measurements::default())).clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cost_is_max() {
        let m = Measurements::default();
        assert_eq!(m.snapshot().calculated_cost, MAX_COST);
    }

    #[test]
    fn registry_shares_instance_across_maps() {
        let reg = Registry::new();
        let id = HubId::from("hub-a".to_string());
        let a = reg.get_or_create(&id);
        let b = reg.get_or_create(&id);
        a.record_latency(20_000_000, 1000);
        assert_eq!(b.snapshot().latency_nanos, Some(20_000_000));
    }

    #[test]
    fn recompute_cost_uses_lane_cost() {
        let m = Measurements::default();
        m.record_latency(20_000_000, 0);
        m.record_capacity(100_000_000, 0);
        m.recompute_cost();
        assert!(m.snapshot().calculated_cost < MAX_COST);
    }
}
