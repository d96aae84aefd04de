//! Hub ID derivation:
//! `Base58(BLAKE2b_256(len(scheme)||scheme||len(pubkey)||pubkey))`, prefixed with its hash-type
//! label.

use blake2::Blake2b;
use blake2::digest::consts::U32;
use blake2::Digest;
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Label identifying which hash function produced a `HubId`. Only one variant exists today; the
/// label is carried so a future scheme change doesn't require a silent reinterpretation of old
/// IDs.
const HASH_LABEL: &str = "blake2b256";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HubId(String);

impl HubId {
    /// Derives the canonical ID for a `scheme`+`pubkey` pair by hashing the length-prefixed
    /// concatenation `len(scheme)||scheme||len(pubkey)||pubkey`.
    pub fn derive(scheme: &str, pubkey: &[u8]) -> Self {
        let bytes = length_prefixed_blocks(scheme.as_bytes(), pubkey);
        let digest = Blake2b256::digest(&bytes);
        let encoded = bs58::encode(digest).into_string();
        Self(format!("{HASH_LABEL}:{encoded}"))
    }

    /// Verifies that `self` is indeed the hash of `scheme`+`pubkey`.
    pub fn verify(&self, scheme: &str, pubkey: &[u8]) -> bool {
        *self == Self::derive(scheme, pubkey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HubId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Builds the two length-prefixed blocks `len(a)||a||len(b)||b` that the wire format hashes
/// byte-for-byte. Lengths are encoded as 4-byte big-endian integers so the encoding is
/// unambiguous regardless of byte contents.
fn length_prefixed_blocks(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + a.len() + b.len());
    out.extend_from_slice(&(a.len() as u32).to_be_bytes());
    out.extend_from_slice(a);
    out.extend_from_slice(&(b.len() as u32).to_be_bytes());
    out.extend_from_slice(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let id1 = HubId::derive("ed25519", b"some-public-key-bytes");
        let id2 = HubId::derive("ed25519", b"some-public-key-bytes");
        assert_eq!(id1, id2);
    }

    #[test]
    fn id_changes_with_scheme_or_key() {
        let base = HubId::derive("ed25519", b"key-a");
        assert_ne!(base, HubId::derive("ed25519", b"key-b"));
        assert_ne!(base, HubId::derive("x25519", b"key-a"));
    }

    #[test]
    fn verify_round_trips() {
        let id = HubId::derive("ed25519", b"key-a");
        assert!(id.verify("ed25519", b"key-a"));
        assert!(!id.verify("ed25519", b"key-b"));
    }
}
