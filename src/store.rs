//! Persistence.
//! Grounded on the prior `core/store` column-family separation (`columns.rs`): one logical
//! keyspace per record kind, documented with its row key shape and content type, generalized
//! here from RocksDB column families to `sled` trees since this crate is a single embedded
//! process rather than a node with its own dedicated storage crate.

use crate::hub::envelope::Envelope;
use crate::hub::HubId;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage engine error: {0}")]
    Engine(#[from] sled::Error),
    #[error("stored record did not decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Which wire message a cached envelope holds, mirroring the `<type>` segment of
/// `cache:spn/msgs/<map>/<type>/<hubID>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Announcement,
    Status,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            MessageKind::Announcement => "announcement",
            MessageKind::Status => "status",
        }
    }
}

/// Durable snapshot of a Hub's identity, independent of its latest `Announcement`/`Status`
/// (those are cached separately as raw envelopes so a restart can re-run them through the apply
/// pipeline instead of trusting a second-hand deserialization of derived fields).
/// - *Row*: `map:<map>/<hubID>` - *Content type*: `HubRecord`, JSON-encoded.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct HubRecord {
    pub id: HubId,
    pub scheme: String,
    pub public_key: Vec<u8>,
    pub verified_ips: bool,
    pub first_seen_millis: i64,
}

/// Embedded persistence for one SPN core process. Every map's Hub records and cached signed
/// envelopes live under a single `sled::Db`, partitioned by `sled::Tree` the way the prior
/// implementation partitions by `DBCol`.
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        Ok(Self { db: sled::open(path)? })
    }

    /// In-memory store for tests and single-process demos that never need to survive a restart.
    pub fn temporary() -> Result<Self, Error> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    fn hub_tree(&self, map: &str) -> Result<sled::Tree, Error> {
        Ok(self.db.open_tree(format!("map:{map}"))?)
    }

    fn msg_tree(&self, map: &str, kind: MessageKind) -> Result<sled::Tree, Error> {
        Ok(self.db.open_tree(format!("cache:spn/msgs/{map}/{}", kind.as_str()))?)
    }

    #[tracing::instrument(target = "spn::store", level = "trace", skip(self, record))]
    pub fn put_hub(&self, map: &str, record: &HubRecord) -> Result<(), Error> {
        let tree = self.hub_tree(map)?;
        tree.insert(record.id.as_str(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn get_hub(&self, map: &str, id: &HubId) -> Result<Option<HubRecord>, Error> {
        let tree = self.hub_tree(map)?;
        decode_opt(tree.get(id.as_str())?)
    }

    pub fn delete_hub(&self, map: &str, id: &HubId) -> Result<(), Error> {
        let tree = self.hub_tree(map)?;
        tree.remove(id.as_str())?;
        self.msg_tree(map, MessageKind::Announcement)?.remove(id.as_str())?;
        self.msg_tree(map, MessageKind::Status)?.remove(id.as_str())?;
        Ok(())
    }

    pub fn iter_hubs(&self, map: &str) -> Result<Vec<HubRecord>, Error> {
        let tree = self.hub_tree(map)?;
        tree.iter().values().filter_map(|v| v.ok()).map(|v| decode(&v)).collect()
    }

    /// Caches the last-accepted signed envelope for a Hub, so a restart can replay it through
    /// `apply_announcement`/`apply_status` without waiting for the peer to re-gossip.
    #[tracing::instrument(target = "spn::store", level = "trace", skip(self, envelope))]
    pub fn put_message(&self, map: &str, kind: MessageKind, id: &HubId, envelope: &Envelope) -> Result<(), Error> {
        let tree = self.msg_tree(map, kind)?;
        tree.insert(id.as_str(), serde_json::to_vec(envelope)?)?;
        Ok(())
    }

    pub fn get_message(&self, map: &str, kind: MessageKind, id: &HubId) -> Result<Option<Envelope>, Error> {
        let tree = self.msg_tree(map, kind)?;
        decode_opt(tree.get(id.as_str())?)
    }

    /// Blocking flush to durable storage, invoked on graceful shutdown.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    Ok(serde_json::from_slice(bytes)?)
}

fn decode_opt<T: DeserializeOwned>(value: Option<sled::IVec>) -> Result<Option<T>, Error> {
    value.map(|v| decode(&v)).transpose()
}
