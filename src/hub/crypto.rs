//! The `Sign`/`Verify` capability. Out of scope as a production primitive, but the crate needs
//! a concrete implementation to exercise the envelope in its own tests, so this module wraps
//! `ed25519-dalek` behind the same seam a real signer would implement.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

pub trait Verify: Send + Sync {
    fn verify(&self, scheme: &str, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

pub trait Sign: Send + Sync {
    fn scheme(&self) -> &str;
    fn public_key(&self) -> Vec<u8>;
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

pub const ED25519_SCHEME: &str = "ed25519";

pub struct Ed25519Signer(SigningKey);

impl Ed25519Signer {
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }
}

impl Sign for Ed25519Signer {
    fn scheme(&self) -> &str {
        ED25519_SCHEME
    }

    fn public_key(&self) -> Vec<u8> {
        self.0.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }
}

#[derive(Default)]
pub struct Ed25519Verifier;

impl Verify for Ed25519Verifier {
    fn verify(&self, scheme: &str, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool {
        if scheme != ED25519_SCHEME {
            return false;
        }
        let Ok(key_bytes) = <[u8; 32]>::try_from(pubkey) else { return false };
        let Ok(vk) = VerifyingKey::from_bytes(&key_bytes) else { return false };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else { return false };
        let sig = Signature::from_bytes(&sig_bytes);
        vk.verify(message, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let signer = Ed25519Signer::generate();
        let msg = b"hello hub";
        let sig = signer.sign(msg);
        let verifier = Ed25519Verifier;
        assert!(verifier.verify(signer.scheme(), &signer.public_key(), msg, &sig));
    }

    #[test]
    fn tampered_message_fails() {
        let signer = Ed25519Signer::generate();
        let sig = signer.sign(b"hello hub");
        let verifier = Ed25519Verifier;
        assert!(!verifier.verify(signer.scheme(), &signer.public_key(), b"hello HUB", &sig));
    }
}
