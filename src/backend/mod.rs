//! Vector-primitive backend capability.
//!
//! The resampler and filter are written against the [`Backend`] trait rather
//! than concrete loops, mirroring the split between algorithm and execution
//! location: the same offspring/ancestry pipeline can run on a sequential
//! host, a thread pool, or an accelerator, as long as the primitives below
//! preserve their sequential semantics at phase boundaries.
//!
//! Only [`HostBackend`] ships. It is deliberately sequential: the sorted
//! resampling path promises bit-reproducible output for a fixed seed, which
//! rules out reduction orders that vary between runs.

/// Vector primitives required by the resampler and filter.
///
/// All operations are associated functions: a backend carries no state, it
/// is a compile-time selection of execution strategy.
pub trait Backend {
    /// Inclusive scan of exponentiated, max-shifted log-weights.
    ///
    /// Writes `out[i] = Σ_{j≤i} exp(lws[j] − max(lws))` and returns the
    /// total mass `W = out[P−1]`. Non-finite log-weights contribute zero
    /// mass, so a degenerate vector yields `W = 0`, never NaN.
    fn cumulative_weights(lws: &[f64], out: &mut [f64]) -> f64;

    /// Numerically stable `log Σ exp(lws[i])`.
    ///
    /// Returns negative infinity when no finite entry exists.
    fn logsumexp(lws: &[f64]) -> f64;

    /// Effective sample size of a log-weight vector:
    /// `exp(2·logsumexp(lws) − logsumexp(2·lws))`.
    ///
    /// Returns 0 when the weight vector is degenerate. The result is capped
    /// at the particle count, which rounding could otherwise exceed by an
    /// ulp for uniform weights.
    fn ess(lws: &[f64]) -> f64 {
        let lse = Self::logsumexp(lws);
        if lse == f64::NEG_INFINITY {
            return 0.0;
        }
        let twice: Vec<f64> = lws.iter().map(|&lw| 2.0 * lw).collect();
        (2.0 * lse - Self::logsumexp(&twice))
            .exp()
            .min(lws.len() as f64)
    }

    /// Inclusive prefix sum over an integer slice.
    fn inclusive_prefix_sum(values: &[usize], out: &mut [usize]);

    /// First-order difference: `out[0] = values[0]`,
    /// `out[i] = values[i] − values[i−1]`.
    fn adjacent_difference(values: &[usize], out: &mut [usize]);

    /// Stable ascending co-sort of `keys`, carrying `values` along.
    fn sort_by_key(keys: &mut [f64], values: &mut [usize]);

    /// Scatter: `out[indices[k]] = values[k]`.
    fn scatter(indices: &[usize], values: &[usize], out: &mut [usize]);

    /// Gather: `out[k] = src[indices[k]]`.
    fn gather(indices: &[usize], src: &[f64], out: &mut [f64]);
}

/// Sequential CPU backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl Backend for HostBackend {
    fn cumulative_weights(lws: &[f64], out: &mut [f64]) -> f64 {
        debug_assert_eq!(lws.len(), out.len());

        let mx = max_finite(lws);
        let mut acc = 0.0;
        for (w, &lw) in out.iter_mut().zip(lws.iter()) {
            if lw.is_finite() {
                acc += (lw - mx).exp();
            }
            *w = acc;
        }
        acc
    }

    fn logsumexp(lws: &[f64]) -> f64 {
        let mx = max_finite(lws);
        if mx == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = lws
            .iter()
            .filter(|lw| lw.is_finite())
            .map(|&lw| (lw - mx).exp())
            .sum();
        mx + sum.ln()
    }

    fn inclusive_prefix_sum(values: &[usize], out: &mut [usize]) {
        debug_assert_eq!(values.len(), out.len());

        let mut acc = 0;
        for (o, &v) in out.iter_mut().zip(values.iter()) {
            acc += v;
            *o = acc;
        }
    }

    fn adjacent_difference(values: &[usize], out: &mut [usize]) {
        debug_assert_eq!(values.len(), out.len());

        let mut prev = 0;
        for (o, &v) in out.iter_mut().zip(values.iter()) {
            *o = v - prev;
            prev = v;
        }
    }

    fn sort_by_key(keys: &mut [f64], values: &mut [usize]) {
        debug_assert_eq!(keys.len(), values.len());

        let n = keys.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));

        let sorted_keys: Vec<f64> = order.iter().map(|&i| keys[i]).collect();
        let sorted_values: Vec<usize> = order.iter().map(|&i| values[i]).collect();
        keys.copy_from_slice(&sorted_keys);
        values.copy_from_slice(&sorted_values);
    }

    fn scatter(indices: &[usize], values: &[usize], out: &mut [usize]) {
        debug_assert_eq!(indices.len(), values.len());

        for (&i, &v) in indices.iter().zip(values.iter()) {
            out[i] = v;
        }
    }

    fn gather(indices: &[usize], src: &[f64], out: &mut [f64]) {
        debug_assert_eq!(indices.len(), out.len());

        for (o, &i) in out.iter_mut().zip(indices.iter()) {
            *o = src[i];
        }
    }
}

/// Maximum over the finite entries of a slice, or negative infinity.
fn max_finite(lws: &[f64]) -> f64 {
    lws.iter()
        .filter(|lw| lw.is_finite())
        .fold(f64::NEG_INFINITY, |a, &b| a.max(b))
}
