//! The derived symmetric key.
//!
//! Holds the output of privacy amplification. Zeroized on drop, not
//! cloneable, and redacted in debug output; callers that need a durable
//! representation must opt in via `to_hex()`.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// A derived symmetric key.
///
/// Does not implement `Clone` to prevent accidental key duplication.
pub struct FinalKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl FinalKey {
    /// Wrap raw key bytes. Crate-internal: keys only come out of
    /// privacy amplification or an explicit hex import.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Zeroizing::new(bytes) }
    }

    /// Reconstruct a key from its hex encoding (e.g. read back from a
    /// caller-side key store).
    ///
    /// Returns `None` for odd-length or non-hex input.
    pub fn from_hex(hex_key: &str) -> Option<Self> {
        hex::decode(hex_key).ok().map(Self::from_bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bits.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Hex encoding of the key. This is the representation handed to the
    /// cipher layer and the caller's key store.
    pub fn to_hex(&self) -> String {
        hex::encode(&*self.bytes)
    }

    /// Short display fingerprint: first 8 bytes of SHA-256 of the key,
    /// hex-encoded. Safe to show or compare out-of-band.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&*self.bytes);
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

// Explicitly NOT implementing Clone
// impl Clone for FinalKey { ... } // FORBIDDEN

impl PartialEq for FinalKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.as_slice() == other.bytes.as_slice()
    }
}

impl Eq for FinalKey {}

impl std::fmt::Debug for FinalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "FinalKey({} bits)", self.bit_len())
    }
}
