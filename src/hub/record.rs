//! The `Hub` record: a remote node's durable identity plus the latest valid
//! `Announcement`/`Status` seen for it.

use super::announcement::Announcement;
use super::id::HubId;
use super::status::Status;
use crate::measurements::Measurements;
use parking_lot::Mutex;
use std::sync::Arc;

/// Obsolescence windows.
pub const VALID_OBSOLESCENCE_DAYS: i64 = 30;
pub const INVALID_OBSOLESCENCE_DAYS: i64 = 7;

/// Mutable fields of a Hub, behind its own lock.
pub struct HubMut {
    pub info: Option<Announcement>,
    pub status: Option<Status>,
    pub verified_ips: bool,
    pub invalid_info: bool,
    pub invalid_status: bool,
    pub first_seen_millis: i64,
    pub has_active_session: bool,
}

pub struct Hub {
    pub id: HubId,
    pub scheme: String,
    pub public_key: Vec<u8>,
    pub map_name: String,
    pub measurements: Arc<Measurements>,
    inner: Mutex<HubMut>,
}

impl Hub {
    pub fn new(id: HubId, scheme: String, public_key: Vec<u8>, map_name: String, measurements: Arc<Measurements>) -> Self {
        Self {
            id,
            scheme,
            public_key,
            map_name,
            measurements,
            inner: Mutex::new(HubMut {
                info: None,
                status: None,
                verified_ips: false,
                invalid_info: false,
                invalid_status: false,
                first_seen_millis: 0,
                has_active_session: false,
            }),
        }
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, HubMut> {
        self.inner.lock()
    }

    /// Obsolescence check: no active session and past the valid/invalid window since the last
    /// accepted update.
    pub fn is_obsolete(&self, now_millis: i64) -> bool {
        let guard = self.inner.lock();
        if guard.has_active_session {
            return false;
        }
        let last_update = guard.info.as_ref().map(|a| a.timestamp).unwrap_or(0)
            .max(guard.status.as_ref().map(|s| s.timestamp).unwrap_or(0));
        let age_days = (now_millis - last_update) / (24 * 60 * 60 * 1000);
        let window = if guard.invalid_info || guard.invalid_status {
            INVALID_OBSOLESCENCE_DAYS
        } else {
            VALID_OBSOLESCENCE_DAYS
        };
        age_days >= window
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::Measurements;

    const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

    fn hub() -> Hub {
        Hub::new(HubId::from("h1".to_string()), "ed25519".to_string(), vec![1, 2, 3], "test-map".to_string(), Arc::new(Measurements::new()))
    }

    fn announcement_at(timestamp: i64) -> Announcement {
        Announcement {
            id: HubId::from("h1".to_string()),
            timestamp,
            name: "hub-one".to_string(),
            group: "group-a".to_string(),
            contact: "operator@example.com".to_string(),
            contact_service: Some("matrix".to_string()),
            hosters: vec!["hoster".to_string()],
            datacenter: "dc1".to_string(),
            ipv4: None,
            ipv6: None,
            transports: vec![],
            entry_policy: vec![],
            exit_policy: vec![],
            flags: vec![],
        }
    }

    #[test]
    fn fresh_hub_with_no_updates_is_not_obsolete() {
        let h = hub();
        assert!(!h.is_obsolete(0));
    }

    #[test]
    fn valid_hub_becomes_obsolete_after_its_window() {
        let h = hub();
        {
            let mut g = h.lock();
            g.info = Some(announcement_at(1000));
        }
        assert!(!h.is_obsolete(1000 + (VALID_OBSOLESCENCE_DAYS - 1) * DAY_MILLIS));
        assert!(h.is_obsolete(1000 + VALID_OBSOLESCENCE_DAYS * DAY_MILLIS));
    }

    #[test]
    fn invalid_hub_uses_the_shorter_window() {
        let h = hub();
        {
            let mut g = h.lock();
            g.info = Some(announcement_at(1000));
            g.invalid_info = true;
        }
        assert!(h.is_obsolete(1000 + INVALID_OBSOLESCENCE_DAYS * DAY_MILLIS));
    }

    #[test]
    fn active_session_never_obsolete_regardless_of_age() {
        let h = hub();
        {
            let mut g = h.lock();
            g.info = Some(announcement_at(0));
            g.has_active_session = true;
        }
        assert!(!h.is_obsolete(1000 * DAY_MILLIS));
    }
}
