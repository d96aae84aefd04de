//! The `Status` record.

use super::id::HubId;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExchangeKey {
    pub id: String,
    pub scheme: String,
    pub bytes: Vec<u8>,
    /// Millis-since-epoch expiry.
    pub expires_at: i64,
}

impl ExchangeKey {
    pub fn is_unexpired(&self, now_millis: i64) -> bool {
        self.expires_at > now_millis
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdvertisedLane {
    pub peer_id: HubId,
    pub capacity_bits_per_sec: u64,
    pub latency_nanos: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Status {
    pub id: HubId,
    pub timestamp: i64,
    pub software_version: String,
    pub exchange_keys: Vec<ExchangeKey>,
    pub lanes: Vec<AdvertisedLane>,
    pub load_percent: u8,
    pub offline: bool,
    pub net_error: bool,
    pub allow_unencrypted: bool,
}

impl Status {
    pub fn has_unexpired_key(&self, now_millis: i64) -> bool {
        self.exchange_keys.iter().any(|k| k.is_unexpired(now_millis))
    }

    /// A handful of historic client releases reported a sentinel version string in place of a
    /// real one when they could not determine their own build info; the map treats a Hub
    /// reporting it as offline.
    pub fn reports_sentinel_offline_version(&self) -> bool {
        self.software_version == "0.0.0-unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(keys: Vec<ExchangeKey>) -> Status {
        Status {
            id: HubId::from("h1".to_string()),
            timestamp: 0,
            software_version: "1.2.3".to_string(),
            exchange_keys: keys,
            lanes: vec![],
            load_percent: 0,
            offline: false,
            net_error: false,
            allow_unencrypted: false,
        }
    }

    fn key(expires_at: i64) -> ExchangeKey {
        ExchangeKey { id: "k".to_string(), scheme: "x25519".to_string(), bytes: vec![1, 2, 3], expires_at }
    }

    #[test]
    fn has_unexpired_key_true_when_any_key_expires_after_now() {
        let s = status(vec![key(100), key(1000)]);
        assert!(s.has_unexpired_key(500));
    }

    #[test]
    fn has_unexpired_key_false_when_all_keys_expired() {
        let s = status(vec![key(100), key(200)]);
        assert!(!s.has_unexpired_key(500));
    }

    #[test]
    fn has_unexpired_key_false_when_no_keys() {
        let s = status(vec![]);
        assert!(!s.has_unexpired_key(500));
    }

    #[test]
    fn sentinel_version_is_detected() {
        let mut s = status(vec![]);
        s.software_version = "0.0.0-unknown".to_string();
        assert!(s.reports_sentinel_offline_version());
    }

    #[test]
    fn real_version_is_not_sentinel() {
        let s = status(vec![]);
        assert!(!s.reports_sentinel_offline_version());
    }
}
