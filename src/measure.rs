//! Component I: measurement driver.
//! Walks a map's regarded Pins, probing each whose TTL has expired and folding the result back
//! into the shared `Measurements` record. Grounded on the prior `stun::query`: a clock-gated
//! async probe wrapped in a bounded timeout, generalized here from a single STUN round-trip
//! into a per-Hub cost-weighted polling loop.

use crate::hub::Hub;
use crate::map::graph::Map;
use crate::map::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// TTL bounds for cost-weighted scheduling.
const MIN_TTL_MILLIS: i64 = 30_000;
const MAX_TTL_MILLIS: i64 = 3_600_000;

/// Base multiplier for directly-connected Pins (HopDistance = 2): these are measured more
/// eagerly since a stale reading directly distorts route costs one hop from home.
const DIRECT_BASE_MILLIS: f64 = 1_000.0;
const DISTANT_BASE_MILLIS: f64 = 5_000.0;

/// Three unknown errors in a single pass abort it.
const UNKNOWN_ERROR_ABORT_THRESHOLD: u32 = 3;

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub latency_nanos: u64,
    pub capacity_bits_per_sec: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("measurement already in progress for this hub")]
    InProgress,
    #[error("remote reports try again later")]
    TryAgainLater,
    #[error("probe timed out")]
    Timeout,
    #[error("unknown probe error: {0}")]
    Unknown(String),
}

/// Performs one measurement round-trip against a Hub. Real implementations dial the Hub's
/// advertised transports; network dialing itself is out of scope here, so this crate only
/// defines the seam.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, hub: &Hub) -> Result<ProbeOutcome, ProbeError>;
}

/// Cost-weighted TTL: `clamp(cost * base, min, max)`.
fn ttl_millis(pin: &Pin, hop_distance: Option<u32>) -> i64 {
    let base = if hop_distance == Some(2) { DIRECT_BASE_MILLIS } else { DISTANT_BASE_MILLIS };
    let raw = (pin.cost.max(0.0) * base) as i64;
    raw.clamp(MIN_TTL_MILLIS, MAX_TTL_MILLIS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    PostponedInProgress,
    AbortedTooManyUnknownErrors,
}

/// Runs one measurement pass over `map`'s regarded Pins whose TTL has expired, probing each via
/// `prober` and folding the result into its shared `Measurements` record.
#[tracing::instrument(target = "spn::measure", level = "debug", skip_all, fields(map = %map.name))]
pub async fn run_pass(map: &Map, prober: &dyn Prober, now_millis: i64) -> PassOutcome {
    let due: Vec<(crate::hub::HubId, Arc<Hub>)> = {
        let r = map.read();
        r.all
            .iter()
            .filter(|(_, pin)| pin.is_regarded())
            .filter_map(|(id, pin)| {
                let hub = r.hubs.get(id)?.clone();
                let ttl = ttl_millis(pin, pin.hop_distance);
                let last_measured = hub.measurements.snapshot().last_measured_millis;
                if now_millis.saturating_sub(last_measured) >= ttl {
                    Some((id.clone(), hub))
                } else {
                    None
                }
            })
            .collect()
    };

    let mut unknown_errors = 0u32;

    for (_, hub) in due {
        match tokio::time::timeout(QUERY_TIMEOUT, prober.probe(&hub)).await {
            Ok(Ok(outcome)) => {
                hub.measurements.record_latency(outcome.latency_nanos, now_millis);
                hub.measurements.record_capacity(outcome.capacity_bits_per_sec, now_millis);
                hub.measurements.recompute_cost();
                crate::metrics::MEASUREMENT_PROBES.with_label_values(&[&map.name, "ok"]).inc();
            }
            Ok(Err(ProbeError::InProgress)) => {
                // postpone the whole pass.
                return PassOutcome::PostponedInProgress;
            }
            Ok(Err(ProbeError::TryAgainLater)) => {
                // skip this peer, continue the pass.
                hub.measurements.mark_dirty();
                crate::metrics::MEASUREMENT_PROBES.with_label_values(&[&map.name, "try_again_later"]).inc();
                continue;
            }
            Ok(Err(ProbeError::Timeout)) | Err(_) => {
                unknown_errors += 1;
                hub.measurements.recompute_cost();
                crate::metrics::MEASUREMENT_PROBES.with_label_values(&[&map.name, "timeout"]).inc();
            }
            Ok(Err(ProbeError::Unknown(_))) => {
                unknown_errors += 1;
                hub.measurements.recompute_cost();
                crate::metrics::MEASUREMENT_PROBES.with_label_values(&[&map.name, "unknown_error"]).inc();
            }
        }

        if unknown_errors >= UNKNOWN_ERROR_ABORT_THRESHOLD {
            // abort the pass.
            return PassOutcome::AbortedTooManyUnknownErrors;
        }
    }

    PassOutcome::Completed
}
