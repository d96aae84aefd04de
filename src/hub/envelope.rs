//! Message codec and signing envelope.
//! One signature seal per message; the public key may be smuggled in a `keys` slot solely to
//! support first-contact TOFU. Callers (the apply pipeline, component E) own the map lookup of
//! a Hub's already-known key; this module only implements the envelope mechanics so it stays a
//! leaf dependency, the same layering the prior implementation keeps between `network_protocol`
//! (wire types) and `peer_manager` (the stateful consumer).

use super::crypto::Verify;
use super::id::HubId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope carries no signature")]
    MissingSignature,
    #[error("envelope carries more than one signature")]
    TooManySignatures,
    #[error("signature verification failed")]
    BadSignature,
    #[error("signer id does not match hash of scheme+pubkey")]
    IdMismatch,
    #[error("tofu key supplied but tofu is not permitted for this message type")]
    TofuNotAllowed,
    #[error("no known public key for signer and no tofu key present")]
    UnknownSigner,
    #[error("payload is not valid JSON: {0}")]
    Json(String),
}

/// A `scheme`+`pubkey` pair smuggled into an envelope for first-contact trust-on-first-use.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TofuKey {
    pub scheme: String,
    pub pubkey: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub signer_id: HubId,
    pub payload: serde_json::Value,
    /// One seal per signature. A well-formed envelope carries exactly one; zero means
    /// `MissingSignature`, more than one means `TooManySignatures` -- the wire format allows a
    /// list here (rather than a single `Vec<u8>`) precisely so that violation is representable
    /// and rejected instead of silently impossible.
    pub signatures: Vec<Vec<u8>>,
    /// Present only on first-contact announcements.
    pub tofu_key: Option<TofuKey>,
}

/// Signs `payload` (any serializable message) as `signer_id`, optionally attaching a TOFU key
/// slot (only meaningful for announcements).
pub fn sign(
    payload: &impl serde::Serialize,
    signer_id: HubId,
    signer: &dyn super::crypto::Sign,
    enable_tofu: bool,
) -> Envelope {
    let payload = serde_json::to_value(payload).expect("payload must serialize");
    let canonical = serde_json::to_vec(&payload).expect("payload must serialize");
    let signatures = vec![signer.sign(&canonical)];
    let tofu_key = enable_tofu.then(|| TofuKey { scheme: signer.scheme().to_string(), pubkey: signer.public_key() });
    Envelope { signer_id, payload, signatures, tofu_key }
}

/// Result of successfully opening an envelope.
pub struct Opened {
    pub payload: serde_json::Value,
    pub signer_id: HubId,
    /// Set when the envelope carried a fresh TOFU key that the caller should pin for this
    /// signer going forward.
    pub learned_key: Option<TofuKey>,
}

/// Verifies an envelope's single signature.
/// `known_pubkey` is `Some((scheme, pubkey))` when the caller already has a pinned key for
/// `envelope.signer_id`; if `None`, the envelope's `tofu_key` is used instead, provided
/// `tofu_allowed`.
pub fn open(
    envelope: &Envelope,
    known_pubkey: Option<(&str, &[u8])>,
    tofu_allowed: bool,
    verifier: &dyn Verify,
) -> Result<Opened, EnvelopeError> {
    let signature = match envelope.signatures.as_slice() {
        [] => return Err(EnvelopeError::MissingSignature),
        [one] => one,
        _ => return Err(EnvelopeError::TooManySignatures),
    };

    let (scheme, pubkey, learned_key): (String, Vec<u8>, Option<TofuKey>) = match known_pubkey {
        Some((scheme, pubkey)) => (scheme.to_string(), pubkey.to_vec(), None),
        None => match &envelope.tofu_key {
            Some(k) if tofu_allowed => (k.scheme.clone(), k.pubkey.clone(), Some(k.clone())),
            Some(_) => return Err(EnvelopeError::TofuNotAllowed),
            None => return Err(EnvelopeError::UnknownSigner),
        },
    };

    if !envelope.signer_id.verify(&scheme, &pubkey) {
        return Err(EnvelopeError::IdMismatch);
    }

    let canonical = serde_json::to_vec(&envelope.payload).map_err(|e| EnvelopeError::Json(e.to_string()))?;
    if !verifier.verify(&scheme, &pubkey, &canonical, signature) {
        return Err(EnvelopeError::BadSignature);
    }

    Ok(Opened { payload: envelope.payload.clone(), signer_id: envelope.signer_id.clone(), learned_key })
}
