//! Sifting.
//!
//! After both parties announce their bases, positions measured under
//! mismatched choices carry no correlation and are discarded. Both sides
//! derive the index set from the same two public announcements, so the sets
//! are identical by construction. Indices are emitted in ascending order;
//! downstream code does not depend on the order, but determinism keeps the
//! two sides and the tests aligned.

use crate::error::ProtocolError;
use crate::protocol::ProtocolVariant;

/// Compute the positions where both parties' choices agree.
///
/// A position qualifies iff the bases match and, for multi-factor, the
/// orientations match too.
///
/// # Errors
///
/// Returns an error on length mismatches between any pair of sequences, or
/// when the variant requires orientation streams that are absent.
pub fn sift_indices(
    my_bases: &[u8],
    their_bases: &[u8],
    my_orientations: Option<&[u8]>,
    their_orientations: Option<&[u8]>,
    variant: ProtocolVariant,
) -> Result<Vec<usize>, ProtocolError> {
    if my_bases.len() != their_bases.len() {
        return Err(ProtocolError::LengthMismatch);
    }

    let orientations = if variant.has_orientation() {
        match (my_orientations, their_orientations) {
            (Some(mine), Some(theirs)) => {
                if mine.len() != my_bases.len() || theirs.len() != my_bases.len() {
                    return Err(ProtocolError::LengthMismatch);
                }
                Some((mine, theirs))
            }
            _ => return Err(ProtocolError::MissingOrientations),
        }
    } else {
        None
    };

    let mut indices = Vec::with_capacity(my_bases.len() / 2);
    for i in 0..my_bases.len() {
        if my_bases[i] != their_bases[i] {
            continue;
        }
        if let Some((mine, theirs)) = orientations {
            if mine[i] != theirs[i] {
                continue;
            }
        }
        indices.push(i);
    }

    Ok(indices)
}

/// Project a bit sequence onto a sift index set, preserving index order.
///
/// # Errors
///
/// Returns `IndexOutOfRange` when an index falls beyond the sequence.
pub fn project(bits: &[u8], indices: &[usize]) -> Result<Vec<u8>, ProtocolError> {
    indices
        .iter()
        .map(|&i| bits.get(i).copied().ok_or(ProtocolError::IndexOutOfRange))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sift_definition() {
        let mine = [0, 0, 1, 1, 0, 1];
        let theirs = [0, 1, 1, 0, 0, 1];
        let indices = sift_indices(&mine, &theirs, None, None, ProtocolVariant::TwoState).unwrap();
        assert_eq!(indices, vec![0, 2, 4, 5]);
    }

    #[test]
    fn test_multi_factor_requires_orientation_match() {
        let mine = [0, 0, 1, 1];
        let theirs = [0, 0, 1, 0];
        let my_ori = [1, 0, 0, 1];
        let their_ori = [1, 1, 0, 1];
        let indices = sift_indices(
            &mine,
            &theirs,
            Some(&my_ori),
            Some(&their_ori),
            ProtocolVariant::MultiFactor,
        )
        .unwrap();
        // Position 0: both match. Position 1: orientation differs.
        // Position 2: both match. Position 3: basis differs.
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_missing_orientations() {
        let bases = [0, 1];
        assert_eq!(
            sift_indices(&bases, &bases, None, None, ProtocolVariant::MultiFactor),
            Err(ProtocolError::MissingOrientations)
        );
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            sift_indices(&[0, 1], &[0], None, None, ProtocolVariant::TwoState),
            Err(ProtocolError::LengthMismatch)
        );
    }

    #[test]
    fn test_sift_size_near_half_and_quarter() {
        let mut rng = StdRng::seed_from_u64(20);
        let n = 10_000;
        let a: Vec<u8> = (0..n).map(|_| rng.gen_range(0..=1)).collect();
        let b: Vec<u8> = (0..n).map(|_| rng.gen_range(0..=1)).collect();
        let oa: Vec<u8> = (0..n).map(|_| rng.gen_range(0..=1)).collect();
        let ob: Vec<u8> = (0..n).map(|_| rng.gen_range(0..=1)).collect();

        let two = sift_indices(&a, &b, None, None, ProtocolVariant::TwoState).unwrap();
        let ratio = two.len() as f64 / n as f64;
        assert!((0.45..0.55).contains(&ratio), "two-state ratio {}", ratio);

        let four = sift_indices(&a, &b, Some(&oa), Some(&ob), ProtocolVariant::MultiFactor).unwrap();
        let ratio = four.len() as f64 / n as f64;
        assert!((0.20..0.30).contains(&ratio), "multi-factor ratio {}", ratio);
    }

    #[test]
    fn test_project_preserves_order() {
        let bits = [1, 0, 1, 1, 0];
        assert_eq!(project(&bits, &[0, 3, 4]).unwrap(), vec![1, 1, 0]);
    }

    #[test]
    fn test_project_out_of_range() {
        assert_eq!(project(&[1, 0], &[2]), Err(ProtocolError::IndexOutOfRange));
    }
}
