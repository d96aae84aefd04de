//! A minimal injectable clock, standing in for `near_async::time::Clock` which is internal to
//! nearcore and unavailable outside it. Every module that reads "now" takes `&dyn Clock` (or a
//! concrete `Clock` handle) rather than calling `SystemTime::now` directly, the same seam the
//! prior implementation crate threads `time::Clock` through (`stun::query`,
//! `RoutingTableViewV2::find_route`).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Monotonic-ish wall clock timestamp, milliseconds since the Unix epoch.
pub type Millis = i64;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Real wall-clock time.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        time::OffsetDateTime::now_utc().unix_timestamp() * 1000
    }
}

/// A clock whose value is set explicitly by the test, never by the wall.
#[derive(Clone)]
pub struct FakeClock(Arc<AtomicI64>);

impl FakeClock {
    pub fn new(start_millis: Millis) -> Self {
        Self(Arc::new(AtomicI64::new(start_millis)))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: Millis) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> Millis {
        self.0.load(Ordering::SeqCst)
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system() -> SharedClock {
    Arc::new(SystemClock)
}
