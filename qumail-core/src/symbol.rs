//! Symbol codec.
//!
//! Bidirectional mapping between a prepared state tuple and the compact
//! integer symbol that crosses the wire — the software analogue of a photon's
//! polarization. The mapping is a complete bijection over the alphabet:
//!
//! ```text
//! symbol = bit | basis << 1                      (two-state,   symbols 0..4)
//! symbol = bit | basis << 1 | orientation << 2   (multi-factor, symbols 0..8)
//! ```
//!
//! The symbol reveals the bit only to a party who also knows (or guesses)
//! the matching basis and orientation. No randomness lives here.

use crate::error::ProtocolError;
use crate::protocol::ProtocolVariant;

/// A decoded transmission state.
///
/// `orientation` is `Some` exactly when the variant is multi-factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolarizedState {
    /// Key bit, 0 or 1.
    pub bit: u8,
    /// Preparation basis, 0 or 1.
    pub basis: u8,
    /// Orientation, 0 or 1; multi-factor only.
    pub orientation: Option<u8>,
}

fn check_bit(value: u8) -> Result<u8, ProtocolError> {
    if value > 1 {
        return Err(ProtocolError::InvalidBit);
    }
    Ok(value)
}

/// Encode a state tuple into its wire symbol.
///
/// # Errors
///
/// Returns an error if any component is not 0/1, or if the orientation's
/// presence does not match the variant.
pub fn encode(state: &PolarizedState, variant: ProtocolVariant) -> Result<u8, ProtocolError> {
    let bit = check_bit(state.bit)?;
    let basis = check_bit(state.basis)?;

    match (variant.has_orientation(), state.orientation) {
        (false, None) => Ok(bit | basis << 1),
        (true, Some(orientation)) => {
            let orientation = check_bit(orientation)?;
            Ok(bit | basis << 1 | orientation << 2)
        }
        (false, Some(_)) | (true, None) => Err(ProtocolError::MissingOrientations),
    }
}

/// Decode a wire symbol back into its state tuple.
///
/// # Errors
///
/// Returns `SymbolOutOfRange` for symbols outside the variant's alphabet.
pub fn decode(symbol: u8, variant: ProtocolVariant) -> Result<PolarizedState, ProtocolError> {
    if symbol >= variant.alphabet_size() {
        return Err(ProtocolError::SymbolOutOfRange);
    }

    Ok(PolarizedState {
        bit: symbol & 1,
        basis: symbol >> 1 & 1,
        orientation: variant.has_orientation().then(|| symbol >> 2 & 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_state_bijection() {
        let mut seen = [false; 4];
        for bit in 0..2u8 {
            for basis in 0..2u8 {
                let state = PolarizedState { bit, basis, orientation: None };
                let symbol = encode(&state, ProtocolVariant::TwoState).unwrap();
                assert!(symbol < 4);
                assert!(!seen[symbol as usize], "collision at symbol {}", symbol);
                seen[symbol as usize] = true;
                assert_eq!(decode(symbol, ProtocolVariant::TwoState).unwrap(), state);
            }
        }
        assert!(seen.iter().all(|&s| s), "image must cover the full alphabet");
    }

    #[test]
    fn test_multi_factor_bijection() {
        let mut seen = [false; 8];
        for bit in 0..2u8 {
            for basis in 0..2u8 {
                for orientation in 0..2u8 {
                    let state = PolarizedState { bit, basis, orientation: Some(orientation) };
                    let symbol = encode(&state, ProtocolVariant::MultiFactor).unwrap();
                    assert!(symbol < 8);
                    assert!(!seen[symbol as usize]);
                    seen[symbol as usize] = true;
                    assert_eq!(decode(symbol, ProtocolVariant::MultiFactor).unwrap(), state);
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_original_state_map() {
        // The historical mapping: '00'→0, '10'→1, '01'→2, '11'→3 (bit, basis).
        for (bit, basis, expected) in [(0, 0, 0), (1, 0, 1), (0, 1, 2), (1, 1, 3)] {
            let state = PolarizedState { bit, basis, orientation: None };
            assert_eq!(encode(&state, ProtocolVariant::TwoState).unwrap(), expected);
        }
    }

    #[test]
    fn test_symbol_out_of_range() {
        assert_eq!(
            decode(4, ProtocolVariant::TwoState),
            Err(ProtocolError::SymbolOutOfRange)
        );
        assert_eq!(
            decode(8, ProtocolVariant::MultiFactor),
            Err(ProtocolError::SymbolOutOfRange)
        );
    }

    #[test]
    fn test_invalid_components() {
        let state = PolarizedState { bit: 2, basis: 0, orientation: None };
        assert_eq!(encode(&state, ProtocolVariant::TwoState), Err(ProtocolError::InvalidBit));

        let state = PolarizedState { bit: 0, basis: 0, orientation: None };
        assert_eq!(
            encode(&state, ProtocolVariant::MultiFactor),
            Err(ProtocolError::MissingOrientations)
        );

        let state = PolarizedState { bit: 0, basis: 0, orientation: Some(1) };
        assert_eq!(
            encode(&state, ProtocolVariant::TwoState),
            Err(ProtocolError::MissingOrientations)
        );
    }
}
