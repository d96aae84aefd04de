//! Prometheus-style counters/gauges, ambient observability carried the same way the prior
//! implementation crate instruments every actor loop (`peer_manager_actor.rs`) with
//! `near_o11y`-style counters: this crate instruments the equivalent hot paths (apply pipeline,
//! optimizer runs, route finder, measurement driver) via the plain `prometheus` crate in place
//! of the prior internal `near-o11y` wrapper.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec, IntCounterVec, IntGaugeVec};

pub static HUBS_TOTAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("spn_hubs_total", "Number of Hubs known to a map.", &["map"]).expect("metric registration")
});

pub static PINS_REGARDED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("spn_pins_regarded", "Number of Pins in Regard state on a map.", &["map"]).expect("metric registration")
});

pub static ANNOUNCEMENTS_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "spn_announcements_applied_total",
        "Outcomes of applying an Announcement.",
        &["map", "outcome"]
    )
    .expect("metric registration")
});

pub static STATUSES_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("spn_statuses_applied_total", "Outcomes of applying a Status.", &["map", "outcome"])
        .expect("metric registration")
});

pub static ROUTE_FIND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("spn_route_find_seconds", "Wall time spent in the route finder.", &["map", "profile"])
        .expect("metric registration")
});

pub static OPTIMIZER_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("spn_optimizer_runs_total", "Optimizer runs by resulting purpose.", &["map", "purpose"])
        .expect("metric registration")
});

pub static MEASUREMENT_PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("spn_measurement_probes_total", "Measurement driver probe outcomes.", &["map", "outcome"])
        .expect("metric registration")
});
