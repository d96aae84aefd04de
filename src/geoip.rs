//! The `LocateIP` capability: `LocateIP(ip) -> Location`. The GeoIP engine itself is out of
//! scope; this module only defines the seam and a deterministic
//! fixture used by tests, the same way the prior implementation injects `time::Clock` rather
//! than owning a wall-clock implementation in every module that needs "now".

use std::collections::HashMap;
use std::net::IpAddr;

/// Coarse location as derived from GeoIP lookup, used for proximity scoring and Intel
/// overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub country: String,
    pub continent: String,
    pub asn: u32,
    pub as_org: String,
    pub latitude: f64,
    pub longitude: f64,
    /// True when GeoIP flags this address as an anycast announcement.
    pub anycast: bool,
}

pub trait LocateIp: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Option<Location>;
}

/// Great-circle proximity expressed as an integer 0..=100, consistent with `((100-p)^3)/100`
/// destination-cost formula (`p` in 0..=100, higher is closer).
pub fn proximity(a: &Location, b: &Location) -> u8 {
    let d = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
    // Normalize against half of Earth's circumference (~20_000km antipodal
    // distance) so same-point lookups score 100 and antipodal score 0.
    let p = 100.0 - (d / 20_000.0 * 100.0).clamp(0.0, 100.0);
    p.round().clamp(0.0, 100.0) as u8
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const R_KM: f64 = 6371.0;
    let (lat1, lon1, lat2, lon2) =
        (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * R_KM * a.sqrt().asin()
}

/// In-memory deterministic `LocateIp` used across tests and `testonly` fixtures.
#[derive(Default)]
pub struct FixtureGeoIp {
    entries: parking_lot::RwLock<HashMap<IpAddr, Location>>,
}

impl FixtureGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ip: IpAddr, loc: Location) {
        self.entries.write().insert(ip, loc);
    }
}

impl LocateIp for FixtureGeoIp {
    fn locate(&self, ip: IpAddr) -> Option<Location> {
        self.entries.read().get(&ip).cloned()
    }
}
