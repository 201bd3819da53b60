//! Privacy amplification.
//!
//! The raw key that survives sifting and error checking is partially exposed:
//! an interceptor may hold correct guesses for some positions even below the
//! QBER threshold. Compressing the raw key with a public random seed through
//! a one-way function leaves any such partial knowledge useless. Both sides
//! compute this independently from the same (raw key, seed) pair and must
//! arrive at the identical final key.

use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::ProtocolError;
use crate::key::FinalKey;
use crate::protocol::PA_SEED_BYTES;

/// Generate a fresh public amplification seed, hex-encoded.
pub fn random_seed<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; PA_SEED_BYTES];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compress a raw key and public seed into a fixed-length final key.
///
/// SHA-256 in counter mode over the ASCII bitstring of the raw key followed
/// by the seed; block `i` is `SHA-256(be32(i) || bits || seed)`, concatenated
/// and truncated to `output_bits`.
///
/// # Errors
///
/// Returns `InvalidKeyLength` when `output_bits` is zero or not a multiple
/// of 8, and `InvalidBit` when the raw key contains non-binary values.
pub fn amplify(raw_key: &[u8], seed: &str, output_bits: usize) -> Result<FinalKey, ProtocolError> {
    if output_bits == 0 || output_bits % 8 != 0 {
        return Err(ProtocolError::InvalidKeyLength);
    }
    if raw_key.iter().any(|&bit| bit > 1) {
        return Err(ProtocolError::InvalidBit);
    }

    let bitstring: Zeroizing<Vec<u8>> =
        Zeroizing::new(raw_key.iter().map(|&bit| b'0' + bit).collect());

    let output_len = output_bits / 8;
    let mut bytes = Vec::with_capacity(output_len);
    let mut counter: u32 = 0;
    while bytes.len() < output_len {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(&*bitstring);
        hasher.update(seed.as_bytes());
        bytes.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    bytes.truncate(output_len);

    Ok(FinalKey::from_bytes(bytes))
}
