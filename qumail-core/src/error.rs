//! Protocol errors.
//!
//! All errors are terminal for the session that produced them. A handshake
//! that receives malformed peer input is aborted, never partially recovered.

use std::fmt;

/// All possible protocol engine errors.
///
/// Each variant aborts the handshake it occurred in. None is retryable;
/// retrying is a caller concern, with a fresh session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Requested symbol count is zero
    InvalidSymbolCount,

    /// Error-check sample fraction outside [0, 1]
    InvalidSampleFraction,

    /// A bit value other than 0 or 1
    InvalidBit,

    /// Symbol outside the variant's alphabet
    SymbolOutOfRange,

    /// Two sequences that must be the same length are not
    LengthMismatch,

    /// Multi-factor operation without orientation data
    MissingOrientations,

    /// Index beyond the end of the key it refers to
    IndexOutOfRange,

    /// Operation not valid in the session's current state
    InvalidTransition,

    /// Requested key length is zero or not byte-aligned
    InvalidKeyLength,

    /// Sealed package is not `hex(nonce):hex(ciphertext)`
    PackageFormat,

    /// Symmetric encryption failed
    EncryptionFailed,

    /// Symmetric decryption or authentication failed
    DecryptionFailed,

    /// One-time pad shorter than the text it must cover
    PadTooShort,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately terse. Do not leak details.
        match self {
            Self::InvalidSymbolCount => write!(f, "invalid symbol count"),
            Self::InvalidSampleFraction => write!(f, "invalid sample fraction"),
            Self::InvalidBit => write!(f, "invalid bit value"),
            Self::SymbolOutOfRange => write!(f, "symbol out of range"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::MissingOrientations => write!(f, "missing orientations"),
            Self::IndexOutOfRange => write!(f, "index out of range"),
            Self::InvalidTransition => write!(f, "invalid transition"),
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::PackageFormat => write!(f, "package format"),
            Self::EncryptionFailed => write!(f, "encryption failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::PadTooShort => write!(f, "pad too short"),
        }
    }
}

impl std::error::Error for ProtocolError {}
