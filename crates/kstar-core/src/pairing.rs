use serde::{Deserialize, Serialize};

use crate::{data::CandidateBatch, KstarError, KstarResult};

/// An ordered pair of batch positions: a primary (K0-like) and a secondary (photon-like)
/// candidate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub primary: usize,
    pub secondary: usize,
}

impl Pair {
    pub const fn new(primary: usize, secondary: usize) -> Self {
        Self { primary, secondary }
    }
}

/// Whether the candidates at positions `a` and `b` use any daughter track in common.
pub fn shares_daughter(batch: &CandidateBatch, a: usize, b: usize) -> bool {
    let [a_pos, a_neg] = batch.daughter_ids(a);
    let [b_pos, b_neg] = batch.daughter_ids(b);
    a_pos == b_pos || a_neg == b_neg || a_pos == b_neg || a_neg == b_pos
}

fn check_mask(batch: &CandidateBatch, mask: &[bool], name: &str) -> KstarResult<()> {
    if mask.len() != batch.len() {
        return Err(KstarError::LengthMismatch {
            context: format!("{name} selection mask"),
            expected: batch.len(),
            actual: mask.len(),
        });
    }
    Ok(())
}

/// Enumerate every (primary, secondary) pair of selected, distinct candidates without a shared
/// daughter track.
///
/// Pairs are emitted in (primary position, secondary position) order. A candidate selected in
/// both categories can appear in both roles, but never paired with itself, and the reversed
/// pair is only emitted if both candidates are selected in both categories.
pub fn build_pairs(
    batch: &CandidateBatch,
    mask_primary: &[bool],
    mask_secondary: &[bool],
) -> KstarResult<Vec<Pair>> {
    check_mask(batch, mask_primary, "primary")?;
    check_mask(batch, mask_secondary, "secondary")?;
    let primaries: Vec<usize> = selected(mask_primary).collect();
    let secondaries: Vec<usize> = selected(mask_secondary).collect();
    let mut pairs = Vec::new();
    for &primary in &primaries {
        for &secondary in &secondaries {
            if primary == secondary || shares_daughter(batch, primary, secondary) {
                continue;
            }
            pairs.push(Pair::new(primary, secondary));
        }
    }
    Ok(pairs)
}

fn selected(mask: &[bool]) -> impl Iterator<Item = usize> + '_ {
    mask.iter()
        .enumerate()
        .filter_map(|(index, &is_selected)| is_selected.then_some(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{test_k0_candidate, test_track, Collision};

    fn batch_with_daughters(daughters: &[(usize, usize)], n_tracks: u64) -> CandidateBatch {
        CandidateBatch::new(
            Collision::default(),
            (0..n_tracks).map(test_track).collect(),
            daughters
                .iter()
                .enumerate()
                .map(|(i, &(pos, neg))| test_k0_candidate(i as u64 + 1, pos, neg))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_overlapping_candidates_scenario() {
        // 1: K0 only, 2: photon only, 3: both and shares a daughter with 1
        let batch = batch_with_daughters(&[(0, 1), (2, 3), (1, 4)], 5);
        let pairs = build_pairs(&batch, &[true, false, true], &[false, true, true]).unwrap();
        assert_eq!(pairs, vec![Pair::new(0, 1), Pair::new(2, 1)]);
    }

    #[test]
    fn test_shares_daughter_checks_all_combinations() {
        let batch = batch_with_daughters(&[(0, 1), (0, 2), (3, 1), (1, 4), (5, 0), (6, 7)], 8);
        for other in 1..5 {
            assert!(shares_daughter(&batch, 0, other));
            assert!(shares_daughter(&batch, other, 0));
        }
        assert!(!shares_daughter(&batch, 0, 5));
    }

    #[test]
    fn test_duplicated_daughter_references() {
        let mut tracks: Vec<_> = (0..4).map(test_track).collect();
        // a second arena entry carrying the same track identifier
        tracks.push(test_track(1));
        let batch = CandidateBatch::new(
            Collision::default(),
            tracks,
            vec![test_k0_candidate(1, 0, 1), test_k0_candidate(2, 4, 2), test_k0_candidate(3, 2, 3)],
        )
        .unwrap();
        let pairs = build_pairs(&batch, &[true, true, true], &[true, true, true]).unwrap();
        assert_eq!(pairs, vec![Pair::new(0, 2), Pair::new(2, 0)]);
    }

    #[test]
    fn test_pair_count_without_shared_daughters() {
        let mut rng = fastrand::Rng::with_seed(313);
        for _ in 0..20 {
            let n = rng.usize(0..12);
            let daughters: Vec<(usize, usize)> = (0..n).map(|i| (2 * i, 2 * i + 1)).collect();
            let batch = batch_with_daughters(&daughters, 2 * n as u64);
            let primary: Vec<bool> = (0..n).map(|_| rng.bool()).collect();
            let secondary: Vec<bool> = (0..n).map(|_| rng.bool()).collect();
            let n_p = primary.iter().filter(|&&b| b).count();
            let n_s = secondary.iter().filter(|&&b| b).count();
            let n_both = primary
                .iter()
                .zip(&secondary)
                .filter(|&(p, s)| *p && *s)
                .count();
            let pairs = build_pairs(&batch, &primary, &secondary).unwrap();
            assert_eq!(pairs.len(), n_p * n_s - n_both);
            for pair in &pairs {
                assert_ne!(pair.primary, pair.secondary);
                assert!(primary[pair.primary]);
                assert!(secondary[pair.secondary]);
            }
        }
    }

    #[test]
    fn test_empty_masks_give_no_pairs() {
        let batch = batch_with_daughters(&[(0, 1), (2, 3)], 4);
        assert!(build_pairs(&batch, &[false, false], &[true, true])
            .unwrap()
            .is_empty());
        let empty = batch_with_daughters(&[], 0);
        assert!(build_pairs(&empty, &[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_mask_length_mismatch_is_an_error() {
        let batch = batch_with_daughters(&[(0, 1), (2, 3)], 4);
        match build_pairs(&batch, &[true, true], &[true]) {
            Err(KstarError::LengthMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected LengthMismatch, got {other:?}"),
        }
    }
}
