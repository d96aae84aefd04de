//! The `Announcement` record.

use super::id::HubId;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Tolerance applied when checking an announcement's timestamp against "now".
pub const CLOCK_SKEW_TOLERANCE_MILLIS: i64 = 12 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Announcement {
    pub id: HubId,
    /// Monotonic timestamp, milliseconds since epoch.
    pub timestamp: i64,
    pub name: String,
    pub group: String,
    pub contact: String,
    pub contact_service: Option<String>,
    pub hosters: Vec<String>,
    pub datacenter: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub transports: Vec<String>,
    pub entry_policy: Vec<String>,
    pub exit_policy: Vec<String>,
    pub flags: Vec<String>,
}

impl Announcement {
    /// True once `prepare` has established at least one valid transport; an announcement with
    /// none is rejected.
    pub fn parsed_transports(&self) -> Vec<crate::transport::Transport> {
        self.transports
            .iter()
            .filter_map(|t| crate::transport::Transport::parse(t).ok())
            .collect()
    }

    pub fn has_required_info(&self) -> bool {
        !self.name.is_empty()
            && !self.group.is_empty()
            && !self.contact.is_empty()
            && self.contact_service.is_some()
            && !self.hosters.is_empty()
            && !self.datacenter.is_empty()
    }

    pub fn within_clock_skew(&self, now_millis: i64) -> bool {
        self.timestamp <= now_millis + CLOCK_SKEW_TOLERANCE_MILLIS
    }
}
