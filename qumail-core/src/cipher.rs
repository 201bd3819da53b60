//! Symmetric cipher layer fed by the derived key.
//!
//! Message bodies are sealed with ChaCha20-Poly1305 under the 256-bit final
//! key. The sealed package travels as `hex(nonce):hex(ciphertext)`, one
//! self-contained string a mail body or header can carry. A one-time-pad
//! helper is kept for callers that hold pad material at least as long as the
//! text.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::Rng;

use crate::error::ProtocolError;
use crate::key::FinalKey;

/// Required key length in bytes.
pub const KEY_BYTES: usize = 32;

/// Nonce length in bytes.
pub const NONCE_BYTES: usize = 12;

fn cipher_for(key: &FinalKey) -> Result<ChaCha20Poly1305, ProtocolError> {
    if key.as_bytes().len() != KEY_BYTES {
        return Err(ProtocolError::InvalidKeyLength);
    }
    ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| ProtocolError::InvalidKeyLength)
}

/// Seal a plaintext under the final key.
///
/// Returns the `hex(nonce):hex(ciphertext)` package. The nonce is fresh and
/// random per call.
///
/// # Errors
///
/// Returns an error for a key that is not 256 bits, or on cipher failure.
pub fn seal<R: Rng + ?Sized>(
    key: &FinalKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<String, ProtocolError> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| ProtocolError::EncryptionFailed)?;

    Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
}

/// Open a sealed package under the final key.
///
/// # Errors
///
/// Returns `PackageFormat` for a malformed package and `DecryptionFailed`
/// when authentication fails (wrong key or tampered ciphertext).
pub fn open(key: &FinalKey, package: &str) -> Result<Vec<u8>, ProtocolError> {
    let cipher = cipher_for(key)?;

    let (nonce_hex, ciphertext_hex) =
        package.split_once(':').ok_or(ProtocolError::PackageFormat)?;
    let nonce = hex::decode(nonce_hex).map_err(|_| ProtocolError::PackageFormat)?;
    if nonce.len() != NONCE_BYTES {
        return Err(ProtocolError::PackageFormat);
    }
    let ciphertext = hex::decode(ciphertext_hex).map_err(|_| ProtocolError::PackageFormat)?;

    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| ProtocolError::DecryptionFailed)
}

/// XOR a text with a hex-encoded pad. Applying the same pad twice restores
/// the input, so this is both directions of a one-time pad.
///
/// # Errors
///
/// Returns `PackageFormat` for non-hex pads and `PadTooShort` when the pad
/// does not cover the text.
pub fn xor_pad(text: &[u8], pad_hex: &str) -> Result<Vec<u8>, ProtocolError> {
    let pad = hex::decode(pad_hex).map_err(|_| ProtocolError::PackageFormat)?;
    if pad.len() < text.len() {
        return Err(ProtocolError::PadTooShort);
    }
    Ok(text.iter().zip(pad).map(|(&byte, pad_byte)| byte ^ pad_byte).collect())
}
