//! Fold assignment and random number helpers for cross-validation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Random generator for one training stream
///
/// With a seed every stream is reproducible and distinct; without one the
/// generator is drawn from entropy.
pub fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// Split `len` shuffled positions into `folds` contiguous test sets
///
/// Fold `i` receives positions `[i * len / folds, (i + 1) * len / folds)` of the
/// permutation.
pub fn shuffled_folds(len: usize, folds: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut perm: Vec<usize> = (0..len).collect();
    perm.shuffle(rng);
    (0..folds)
        .map(|i| perm[i * len / folds..(i + 1) * len / folds].to_vec())
        .collect()
}

/// Split class groups into `folds` test sets keeping class proportions
///
/// Each class is shuffled on its own and fold `i` takes
/// `n_c * (i + 1) / folds - n_c * i / folds` of its members.
pub fn stratified_folds(groups: &[Vec<usize>], folds: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut result = vec![Vec::new(); folds];
    for group in groups {
        let mut members = group.clone();
        members.shuffle(rng);
        let n = members.len();
        for (i, fold) in result.iter_mut().enumerate() {
            fold.extend_from_slice(&members[i * n / folds..(i + 1) * n / folds]);
        }
    }
    for fold in &mut result {
        fold.shuffle(rng);
    }
    result
}

/// Positions in `[0, len)` that are not in `test`
pub fn complement(len: usize, test: &[usize]) -> Vec<usize> {
    let mut held_out = vec![false; len];
    for &k in test {
        held_out[k] = true;
    }
    (0..len).filter(|&k| !held_out[k]).collect()
}
