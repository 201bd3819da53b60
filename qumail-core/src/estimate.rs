//! Error-rate estimation.
//!
//! One party discloses a random half of its sifted key; the other counts
//! disagreements to estimate the channel's bit error rate. Every disclosed
//! position is burned: the remaining key must never include an index the
//! adversary has seen, or the disclosure would leak into the final key.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::ProtocolError;

/// One disclosed sifted-key position.
///
/// `index` refers to a position in the sifted key, not the raw symbol stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleEntry {
    /// Position in the sifted key.
    #[serde(rename = "i")]
    pub index: usize,
    /// The disclosing party's bit at that position.
    #[serde(rename = "val")]
    pub value: u8,
}

/// A disclosed error-check sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// The disclosed (index, value) pairs.
    pub entries: Vec<SampleEntry>,
}

/// The outcome of checking a peer's sample against one's own sifted key.
pub struct ErrorCheck {
    /// Fraction of sampled positions that disagreed; 0.0 for an empty sample.
    pub qber: f64,
    /// The sifted key with every sampled position removed, in original
    /// relative order. This is the raw material for privacy amplification.
    pub remaining: Zeroizing<Vec<u8>>,
}

/// Draw an error-check sample from a sifted key.
///
/// Chooses `floor(len * fraction)` positions uniformly without replacement.
///
/// # Errors
///
/// Returns `InvalidSampleFraction` when `fraction` is outside `[0, 1]`.
pub fn sample<R: Rng + ?Sized>(
    sifted_key: &[u8],
    fraction: f64,
    rng: &mut R,
) -> Result<Sample, ProtocolError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ProtocolError::InvalidSampleFraction);
    }

    let count = (sifted_key.len() as f64 * fraction).floor() as usize;
    let mut indices: Vec<usize> = (0..sifted_key.len()).collect();
    indices.shuffle(rng);
    indices.truncate(count);

    let entries = indices
        .into_iter()
        .map(|index| SampleEntry { index, value: sifted_key[index] })
        .collect();

    Ok(Sample { entries })
}

/// Check a peer's sample against one's own sifted key.
///
/// Counts disagreements over the sampled positions and strips every sampled
/// index from the key.
///
/// # Errors
///
/// Returns `IndexOutOfRange` when a sample index falls beyond the key.
pub fn check_errors(my_sifted_key: &[u8], sample: &Sample) -> Result<ErrorCheck, ProtocolError> {
    let mut disclosed = HashSet::with_capacity(sample.entries.len());
    let mut mismatches = 0usize;

    for entry in &sample.entries {
        let mine = my_sifted_key
            .get(entry.index)
            .copied()
            .ok_or(ProtocolError::IndexOutOfRange)?;
        disclosed.insert(entry.index);
        if mine != entry.value {
            mismatches += 1;
        }
    }

    let qber = if sample.entries.is_empty() {
        0.0
    } else {
        mismatches as f64 / sample.entries.len() as f64
    };

    let remaining = my_sifted_key
        .iter()
        .enumerate()
        .filter(|(i, _)| !disclosed.contains(i))
        .map(|(_, &bit)| bit)
        .collect();

    Ok(ErrorCheck { qber, remaining: Zeroizing::new(remaining) })
}
