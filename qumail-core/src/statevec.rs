//! Private state vector generation.
//!
//! Each party's contribution to a session starts as uniformly random bit
//! sequences: key bits and preparation bases for the initiator, measurement
//! bases for the responder, plus orientations when the variant carries them.
//! The bit sequence is the secret; it is zeroized on drop and never leaves
//! this process. Bases and orientations are announced publicly later in the
//! protocol, so they are held as plain vectors.

use rand::Rng;
use zeroize::Zeroizing;

use crate::error::ProtocolError;
use crate::protocol::ProtocolVariant;
use crate::symbol::{encode, PolarizedState};

/// A party's private random choices for one session.
///
/// Owned exclusively by the party that generated it; never transmitted.
pub struct StateVector {
    bits: Zeroizing<Vec<u8>>,
    bases: Vec<u8>,
    orientations: Option<Vec<u8>>,
}

impl StateVector {
    /// Number of generated states.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the vector is empty. Never true for generated material.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The private key bits.
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// The preparation bases.
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// The preparation orientations, multi-factor only.
    pub fn orientations(&self) -> Option<&[u8]> {
        self.orientations.as_deref()
    }

    /// Clone out the announceable part (bases and orientations).
    ///
    /// Called when the protocol reaches the basis-announcement step; the
    /// bits stay private.
    pub fn basis_choice(&self) -> BasisChoice {
        BasisChoice {
            bases: self.bases.clone(),
            orientations: self.orientations.clone(),
        }
    }
}

/// A basis (and orientation) choice, independent of any bit values.
///
/// This is what each party announces publicly once the symbol stream has
/// been transmitted and measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasisChoice {
    /// Measurement or preparation bases, one per symbol.
    pub bases: Vec<u8>,
    /// Orientations, one per symbol; multi-factor only.
    pub orientations: Option<Vec<u8>>,
}

impl BasisChoice {
    /// Number of choices.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Whether the choice is empty.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// The initiator's generated material: the private vector and the public
/// symbol stream encoding it.
pub struct InitiatorMaterial {
    /// The private state vector. Never transmitted.
    pub private: StateVector,
    /// The public symbol stream, the only representation of the state that
    /// crosses the wire.
    pub symbols: Vec<u8>,
}

fn random_bits<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<u8> {
    (0..len).map(|_| rng.gen_range(0..=1u8)).collect()
}

/// Generate the initiator's private material and its public symbol stream.
///
/// # Errors
///
/// Returns `InvalidSymbolCount` when `num_symbols` is zero.
pub fn generate_initiator_material<R: Rng + ?Sized>(
    num_symbols: usize,
    variant: ProtocolVariant,
    rng: &mut R,
) -> Result<InitiatorMaterial, ProtocolError> {
    if num_symbols == 0 {
        return Err(ProtocolError::InvalidSymbolCount);
    }

    let bits = Zeroizing::new(random_bits(num_symbols, rng));
    let bases = random_bits(num_symbols, rng);
    let orientations = variant.has_orientation().then(|| random_bits(num_symbols, rng));

    let mut symbols = Vec::with_capacity(num_symbols);
    for i in 0..num_symbols {
        let state = PolarizedState {
            bit: bits[i],
            basis: bases[i],
            orientation: orientations.as_ref().map(|o| o[i]),
        };
        symbols.push(encode(&state, variant)?);
    }

    Ok(InitiatorMaterial {
        private: StateVector { bits, bases, orientations },
        symbols,
    })
}

/// Generate the responder's random measurement choice.
///
/// Independent of any received data; drawn before measurement.
///
/// # Errors
///
/// Returns `InvalidSymbolCount` when `num_symbols` is zero.
pub fn generate_responder_bases<R: Rng + ?Sized>(
    num_symbols: usize,
    variant: ProtocolVariant,
    rng: &mut R,
) -> Result<BasisChoice, ProtocolError> {
    if num_symbols == 0 {
        return Err(ProtocolError::InvalidSymbolCount);
    }

    Ok(BasisChoice {
        bases: random_bits(num_symbols, rng),
        orientations: variant.has_orientation().then(|| random_bits(num_symbols, rng)),
    })
}
