//! Ancestry algebra.
//!
//! Conversions between the three equivalent encodings of a resampling
//! outcome — offspring counts, cumulative offspring, and ancestor vectors —
//! plus the permutation that makes an ancestry safe for in-place copying,
//! the proposal weight correction, and the in-place ensemble copy itself.
//!
//! An ancestry `as` is **in-place copyable** when every surviving index `j`
//! (one that appears as a value in `as`) satisfies `as[j] == j`. Under that
//! condition every copy source is a self-mapped row that no copy ever
//! overwrites, so rows can be copied in any order without a scratch buffer.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::backend::Backend;

/// Sentinel for an unclaimed slot during permutation.
#[inline]
fn unclaimed(len: usize) -> usize {
    len
}

/// Count offspring per particle from an ancestor vector.
///
/// `os[j]` receives the number of occurrences of `j` in `ancestors`.
pub fn ancestors_to_offspring(ancestors: &[usize], os: &mut [usize]) {
    os.fill(0);
    for &a in ancestors {
        debug_assert!(a < os.len());
        os[a] += 1;
    }
}

/// Expand an offspring vector into an ancestor vector.
///
/// Each particle `j` with `os[j] > 0` is emitted exactly `os[j]` times, in
/// ascending parent order. `ancestors.len()` must equal `Σ os`.
pub fn offspring_to_ancestors(os: &[usize], ancestors: &mut [usize]) {
    debug_assert_eq!(os.iter().sum::<usize>(), ancestors.len());

    let mut i = 0;
    for (j, &o) in os.iter().enumerate() {
        for _ in 0..o {
            ancestors[i] = j;
            i += 1;
        }
    }
}

/// Expand an offspring vector into an already-permuted ancestor vector.
pub fn offspring_to_ancestors_permute(os: &[usize], ancestors: &mut [usize]) {
    offspring_to_ancestors(os, ancestors);
    permute(ancestors);
}

/// Expand a cumulative offspring vector into an ancestor vector.
///
/// For each output slot `i`, the ancestor is the smallest `j` with
/// `os_cum[j] > i`. `ancestors.len()` must equal `os_cum[P−1]`.
pub fn cumulative_offspring_to_ancestors(os_cum: &[usize], ancestors: &mut [usize]) {
    debug_assert_eq!(os_cum.last().copied().unwrap_or(0), ancestors.len());

    let mut j = 0;
    for (i, a) in ancestors.iter_mut().enumerate() {
        while os_cum[j] <= i {
            j += 1;
        }
        *a = j;
    }
}

/// Expand a cumulative offspring vector into an already-permuted ancestor
/// vector.
pub fn cumulative_offspring_to_ancestors_permute(os_cum: &[usize], ancestors: &mut [usize]) {
    cumulative_offspring_to_ancestors(os_cum, ancestors);
    permute(ancestors);
}

/// First permutation phase: claim resolution.
///
/// `claims[j]` receives the index of the winning writer for slot `j`, or the
/// sentinel value `ancestors.len()` when no writer targets slot `j` (the
/// slot is dead). Self-loops claim their own slot with priority; remaining
/// writers claim first-come in ascending index order, which keeps the
/// outcome deterministic.
pub fn pre_permute(ancestors: &[usize], claims: &mut [usize]) {
    debug_assert_eq!(ancestors.len(), claims.len());
    debug_assert!(ancestors.iter().all(|&a| a < ancestors.len()));

    let sentinel = unclaimed(ancestors.len());
    claims.fill(sentinel);

    for (i, &a) in ancestors.iter().enumerate() {
        if a == i {
            claims[i] = i;
        }
    }
    for (i, &a) in ancestors.iter().enumerate() {
        if a != i && claims[a] == sentinel {
            claims[a] = i;
        }
    }
}

/// Second permutation phase: final placement.
///
/// Every claimed slot becomes a self-loop carrying its own index; each
/// displaced writer's ancestor value is scattered into the unclaimed (dead)
/// slots in ascending order. The output is in-place copyable and carries the
/// same ancestor multiset as the input.
pub fn post_permute(ancestors: &[usize], claims: &[usize], out: &mut [usize]) {
    debug_assert_eq!(ancestors.len(), claims.len());
    debug_assert_eq!(ancestors.len(), out.len());

    let sentinel = unclaimed(ancestors.len());

    for (j, &c) in claims.iter().enumerate() {
        if c != sentinel {
            out[j] = j;
        }
    }

    let mut free = claims
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == sentinel)
        .map(|(j, _)| j);
    for (i, &a) in ancestors.iter().enumerate() {
        if claims[a] != i {
            let k = free.next().expect("one dead slot per displaced writer");
            out[k] = a;
        }
    }
}

/// Permute an ancestor vector in place so that it is in-place copyable.
///
/// Preserves the ancestor multiset. An ancestry that is already in-place
/// copyable keeps every self-loop where it is.
pub fn permute(ancestors: &mut [usize]) {
    let mut claims = vec![0; ancestors.len()];
    let mut out = vec![0; ancestors.len()];
    pre_permute(ancestors, &mut claims);
    post_permute(ancestors, &claims, &mut out);
    ancestors.copy_from_slice(&out);
}

/// Is every surviving index self-mapped?
pub fn is_in_place_copyable(ancestors: &[usize]) -> bool {
    ancestors.iter().all(|&a| ancestors[a] == a)
}

/// Correct log-weights after resampling with proposal weights.
///
/// Assuming the resample used `qlws`, the importance weight of particle `i`
/// becomes `lws[ancestors[i]] − qlws[ancestors[i]]`.
pub fn correct<B: Backend>(ancestors: &[usize], qlws: &[f64], lws: &mut [f64]) {
    debug_assert_eq!(qlws.len(), lws.len());
    debug_assert_eq!(ancestors.len(), lws.len());

    let mut target = vec![0.0; lws.len()];
    let mut proposal = vec![0.0; lws.len()];
    B::gather(ancestors, lws, &mut target);
    B::gather(ancestors, qlws, &mut proposal);

    for ((lw, t), q) in lws.iter_mut().zip(target.iter()).zip(proposal.iter()) {
        *lw = t - q;
    }
}

/// In-place row copy of the ensemble matrix based on a permuted ancestry.
///
/// For each slot `i` with `ancestors[i] != i`, row `i` is overwritten by row
/// `ancestors[i]`. The ancestry must be in-place copyable (see [`permute`]):
/// every copy source is then self-mapped and never overwritten, so columns
/// can be processed independently and in parallel.
pub fn copy(ancestors: &[usize], x: &mut DMatrix<f64>) {
    let p = ancestors.len();
    debug_assert!(p <= x.nrows());
    debug_assert!(is_in_place_copyable(ancestors));

    let nrows = x.nrows();
    x.as_mut_slice().par_chunks_mut(nrows).for_each(|col| {
        for (i, &a) in ancestors.iter().enumerate() {
            if a != i {
                col[i] = col[a];
            }
        }
    });
}
