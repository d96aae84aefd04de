//! `Map`: named container of Pins, regions, Intel, and home.
//! The map uses a single readers-writer lock protecting `all`, `regions`, `home`; `intel` is
//! hot-swappable independently via `arc_swap::ArcSwap`, since intel updates
//! (`PUT /map/{map}/intel/update`) are far rarer than reads and shouldn't contend with the map lock at
//! all.

use super::pin::Pin;
use super::region::Region;
use crate::hub::HubId;
use crate::intel::Intel;
use crate::measurements::Registry as MeasurementsRegistry;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Which IP scope this map's Hubs are expected to advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapScope {
    Local,
    Public,
}

pub struct MapInner {
    pub all: HashMap<HubId, Pin>,
    pub hubs: HashMap<HubId, Arc<crate::hub::Hub>>,
    pub regions: Vec<Region>,
    pub home: Option<HubId>,
    pub home_terminal: Option<HubId>,
}

pub struct Map {
    pub name: String,
    pub scope: MapScope,
    pub measurements: Arc<MeasurementsRegistry>,
    pub geoip: Arc<dyn crate::geoip::LocateIp>,
    intel: ArcSwap<Intel>,
    inner: RwLock<MapInner>,
}

impl Map {
    pub fn new(name: impl Into<String>, scope: MapScope, measurements: Arc<MeasurementsRegistry>, geoip: Arc<dyn crate::geoip::LocateIp>) -> Self {
        Self {
            name: name.into(),
            scope,
            measurements,
            geoip,
            intel: ArcSwap::from_pointee(Intel::empty()),
            inner: RwLock::new(MapInner {
                all: HashMap::new(),
                hubs: HashMap::new(),
                regions: vec![],
                home: None,
                home_terminal: None,
            }),
        }
    }

    /// Returns the existing `Hub` for `id`, or creates and registers a new one.
    pub fn get_or_create_hub(&self, id: &HubId, scheme: &str, pubkey: &[u8]) -> (Arc<crate::hub::Hub>, bool) {
        let mut w = self.inner.write();
        if let Some(existing) = w.hubs.get(id) {
            return (existing.clone(), false);
        }
        let measurements = self.measurements.get_or_create(id);
        let hub = Arc::new(crate::hub::Hub::new(id.clone(), scheme.to_string(), pubkey.to_vec(), self.name.clone(), measurements));
        w.hubs.insert(id.clone(), hub.clone());
        (hub, true)
    }

    pub fn get_hub(&self, id: &HubId) -> Option<Arc<crate::hub::Hub>> {
        self.inner.read().hubs.get(id).cloned()
    }

    pub fn remove_hub(&self, id: &HubId) {
        let mut w = self.inner.write();
        w.hubs.remove(id);
        w.all.remove(id);
    }

    pub fn intel(&self) -> Arc<Intel> {
        self.intel.load_full()
    }

    /// `PUT /map/{map}/intel/update`. Recomputes the region list; membership itself is
    /// re-derived the next time any Pin's entity changes.
    pub fn update_intel(&self, intel: Intel) -> Result<(), crate::endpoint::ParseError> {
        let regions = intel
            .regions
            .iter()
            .map(Region::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        self.intel.store(Arc::new(intel));
        self.inner.write().regions = regions;
        Ok(())
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, MapInner> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, MapInner> {
        self.inner.write()
    }

    pub fn set_home(&self, id: HubId) {
        self.inner.write().home = Some(id);
    }

    pub fn home(&self) -> Option<HubId> {
        self.inner.read().home.clone()
    }

    pub fn get_or_create_pin(&self, id: &HubId) -> bool {
        let mut w = self.inner.write();
        if w.all.contains_key(id) {
            false
        } else {
            w.all.insert(id.clone(), Pin::new(id.clone()));
            true
        }
    }

    pub fn remove_pin(&self, id: &HubId) -> Option<Pin> {
        self.inner.write().all.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
