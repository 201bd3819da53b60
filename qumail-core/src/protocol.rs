//! Protocol variants and sizing constants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Oversampling factor applied to the raw key target.
///
/// Sifting discards roughly half the positions (two-state) or three quarters
/// (multi-factor), and error checking discloses half of what survives, so the
/// initiator transmits ten symbols per target key bit.
pub const PHOTON_MULTIPLIER: usize = 10;

/// Default raw key target in bits.
pub const RAW_KEY_TARGET_BITS: usize = 512;

/// Default fraction of the sifted key disclosed for error checking.
pub const SAMPLE_FRACTION: f64 = 0.5;

/// Length of the amplified final key in bits. Fixed protocol-wide; both
/// sides must compress to the same length without negotiating it.
pub const FINAL_KEY_BITS: usize = 256;

/// Length of the privacy-amplification seed in bytes (hex-encoded on the wire).
pub const PA_SEED_BYTES: usize = 16;

/// Which key-agreement protocol a session runs.
///
/// The variant selects the symbol alphabet, whether an orientation dimension
/// exists, and the QBER acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// BB84-like two-state protocol: state = (bit, basis), 4 symbols.
    #[serde(rename = "BB84")]
    TwoState,

    /// Multi-factor protocol: state = (bit, basis, orientation), 8 symbols.
    #[serde(rename = "MF-QKD")]
    MultiFactor,
}

impl ProtocolVariant {
    /// Number of distinct symbols in this variant's alphabet.
    pub fn alphabet_size(self) -> u8 {
        match self {
            Self::TwoState => 4,
            Self::MultiFactor => 8,
        }
    }

    /// Whether states carry an orientation component.
    pub fn has_orientation(self) -> bool {
        matches!(self, Self::MultiFactor)
    }

    /// QBER above which a session must be rejected.
    ///
    /// The multi-factor threshold is tighter: the extra agreement dimension
    /// leaves an interceptor a smaller signature to hide in.
    pub fn qber_threshold(self) -> f64 {
        match self {
            Self::TwoState => 0.15,
            Self::MultiFactor => 0.08,
        }
    }

    /// Protocol name as carried on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::TwoState => "BB84",
            Self::MultiFactor => "MF-QKD",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_sizes() {
        assert_eq!(ProtocolVariant::TwoState.alphabet_size(), 4);
        assert_eq!(ProtocolVariant::MultiFactor.alphabet_size(), 8);
    }

    #[test]
    fn test_thresholds() {
        assert!(ProtocolVariant::MultiFactor.qber_threshold() < ProtocolVariant::TwoState.qber_threshold());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(ProtocolVariant::TwoState.to_string(), "BB84");
        assert_eq!(ProtocolVariant::MultiFactor.to_string(), "MF-QKD");
    }
}
