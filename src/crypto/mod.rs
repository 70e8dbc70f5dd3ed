//! Constant-time comparison and webhook payload signatures.
//!
//! Every credential check in the crate (webhook tokens, signatures, basic
//! auth) goes through [`ConstantTimeComparer`]. Both sides are reduced to a
//! fixed-width SHA-256 digest before the constant-time primitive, so the
//! comparison cannot leak the length of either value.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compares an expected value against candidates in constant time.
///
/// The expected value is hashed once at construction; each candidate is
/// hashed at comparison time.
pub struct ConstantTimeComparer {
    target_hash: [u8; 32],
}

impl ConstantTimeComparer {
    pub fn new(target: &str) -> Self {
        Self::from_bytes(target.as_bytes())
    }

    pub fn from_bytes(target: &[u8]) -> Self {
        Self {
            target_hash: Sha256::digest(target).into(),
        }
    }

    pub fn eq(&self, value: &str) -> bool {
        self.eq_bytes(value.as_bytes())
    }

    pub fn eq_bytes(&self, value: &[u8]) -> bool {
        let value_hash: [u8; 32] = Sha256::digest(value).into();
        self.target_hash.ct_eq(&value_hash).into()
    }
}

/// HMAC-SHA256 of the raw webhook payload, keyed with the project secret.
pub fn payload_signature(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}
