//! Keyed hashing for licence keys.
//!
//! Licence keys are bearer secrets, so only an HMAC-SHA256 digest is stored.
//! The HMAC key comes from configuration; without it a leaked database cannot
//! be used to confirm guessed licence keys offline.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Hashes licence keys for storage and lookup.
///
/// Thread-safe and cheaply cloneable.
#[derive(Clone)]
pub struct KeyHasher {
    hmac_key: [u8; 32],
}

impl KeyHasher {
    /// Create a KeyHasher from a raw 32-byte HMAC key.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { hmac_key: key }
    }

    /// Parse a 64-character hex string into a KeyHasher.
    pub fn from_hex(hex_key: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| format!("key hash secret is not valid hex: {}", e))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "key hash secret must be exactly 32 bytes (64 hex chars)".to_string())?;
        Ok(Self::from_bytes(key))
    }

    /// Hash a licence key. Keys are used verbatim: no trimming or case folding.
    pub fn hash(&self, key: &str) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.hmac_key)
            .expect("HMAC accepts keys of any length");
        mac.update(b"tollgate-licence-v1:");
        mac.update(key.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for KeyHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHasher").finish_non_exhaustive()
    }
}
