//! Measurement simulation.
//!
//! Models the collapse-on-measurement rule the protocol's security rests on:
//! a received symbol read in the matching basis (and orientation) yields the
//! encoded bit faithfully; any mismatch yields an independent uniform bit.
//! This is the sole source of noise on a clean channel, and it must not bias
//! matched positions — with no adversary, sifted keys agree with
//! probability 1.

use rand::Rng;

use crate::error::ProtocolError;
use crate::protocol::ProtocolVariant;
use crate::statevec::BasisChoice;
use crate::symbol::decode;

/// Measure a received symbol stream with the given private choice.
///
/// Returns one bit per symbol.
///
/// # Errors
///
/// Returns an error when the choice length does not match the stream, the
/// variant requires orientations the choice lacks, or a symbol falls outside
/// the alphabet.
pub fn measure<R: Rng + ?Sized>(
    symbols: &[u8],
    choice: &BasisChoice,
    variant: ProtocolVariant,
    rng: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    if choice.len() != symbols.len() {
        return Err(ProtocolError::LengthMismatch);
    }

    let orientations = match (variant.has_orientation(), choice.orientations.as_deref()) {
        (true, None) => return Err(ProtocolError::MissingOrientations),
        (true, Some(o)) if o.len() != symbols.len() => return Err(ProtocolError::LengthMismatch),
        (_, o) => o,
    };

    let mut measured = Vec::with_capacity(symbols.len());
    for (i, &symbol) in symbols.iter().enumerate() {
        let state = decode(symbol, variant)?;
        let basis_match = state.basis == choice.bases[i];
        let orientation_match = match (state.orientation, orientations) {
            (Some(encoded), Some(chosen)) => encoded == chosen[i],
            _ => true,
        };

        if basis_match && orientation_match {
            measured.push(state.bit);
        } else {
            measured.push(rng.gen_range(0..=1));
        }
    }

    Ok(measured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statevec::generate_initiator_material;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_matching_choice_is_faithful() {
        let mut rng = StdRng::seed_from_u64(10);
        let material =
            generate_initiator_material(256, ProtocolVariant::TwoState, &mut rng).unwrap();

        // Measuring with the preparer's own choice must reproduce every bit.
        let choice = material.private.basis_choice();
        let measured = measure(&material.symbols, &choice, ProtocolVariant::TwoState, &mut rng).unwrap();
        assert_eq!(measured, material.private.bits());
    }

    #[test]
    fn test_multi_factor_matching_choice_is_faithful() {
        let mut rng = StdRng::seed_from_u64(11);
        let material =
            generate_initiator_material(256, ProtocolVariant::MultiFactor, &mut rng).unwrap();
        let choice = material.private.basis_choice();
        let measured =
            measure(&material.symbols, &choice, ProtocolVariant::MultiFactor, &mut rng).unwrap();
        assert_eq!(measured, material.private.bits());
    }

    #[test]
    fn test_mismatched_basis_yields_valid_bits() {
        let mut rng = StdRng::seed_from_u64(12);
        let material =
            generate_initiator_material(256, ProtocolVariant::TwoState, &mut rng).unwrap();

        // Invert every basis: all positions mismatch, output is random but binary.
        let mut choice = material.private.basis_choice();
        for basis in &mut choice.bases {
            *basis ^= 1;
        }
        let measured = measure(&material.symbols, &choice, ProtocolVariant::TwoState, &mut rng).unwrap();
        assert_eq!(measured.len(), 256);
        assert!(measured.iter().all(|&b| b <= 1));
    }

    #[test]
    fn test_length_mismatch() {
        let mut rng = StdRng::seed_from_u64(13);
        let material =
            generate_initiator_material(64, ProtocolVariant::TwoState, &mut rng).unwrap();
        let choice = crate::statevec::generate_responder_bases(32, ProtocolVariant::TwoState, &mut rng)
            .unwrap();
        assert_eq!(
            measure(&material.symbols, &choice, ProtocolVariant::TwoState, &mut rng).err(),
            Some(ProtocolError::LengthMismatch)
        );
    }

    #[test]
    fn test_missing_orientations() {
        let mut rng = StdRng::seed_from_u64(14);
        let material =
            generate_initiator_material(64, ProtocolVariant::MultiFactor, &mut rng).unwrap();
        let choice = crate::statevec::generate_responder_bases(64, ProtocolVariant::TwoState, &mut rng)
            .unwrap();
        assert_eq!(
            measure(&material.symbols, &choice, ProtocolVariant::MultiFactor, &mut rng).err(),
            Some(ProtocolError::MissingOrientations)
        );
    }
}
