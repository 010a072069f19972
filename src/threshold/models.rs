//! The three error models the probabilistic threshold is built from, chained
//! bottom-up: how often a single substitution destroys minimisers it doesn't
//! directly overlap (Monte Carlo calibration), how that combines with the
//! minimisers a substitution always destroys directly (closed form), and how
//! several independent substitutions combine (log-space convolution).

use super::logspace;
use super::pascal_row::pascal_row;
use crate::rng::SplitMix64;
use seqkmer::{char_to_value, Shape};

const ITERATIONS: u64 = 10_000;
const SEED: u64 = 0x1D2B_8284_D988_C4D0;

/// Raw (non-deduplicated) minimum hash of every `window_size`-base window,
/// using `shape` to hash each informative sub-k-mer. Brute force; only ever
/// run over the short random sequences the Monte Carlo model generates.
fn window_minima(seq: &[u8], shape: &Shape, window_size: usize) -> Vec<u64> {
    let s = shape.size() as usize;
    let windows = seq.len() + 1 - window_size;
    let mut out = Vec::with_capacity(windows);
    for start in 0..windows {
        let mut min = u64::MAX;
        for kmer_start in start..=start + window_size - s {
            let mut value = 0u64;
            for &base in &seq[kmer_start..kmer_start + s] {
                value = (value << 2) | char_to_value(base).expect("generated sequence is pure ACGT");
            }
            let hash = shape.hash_of(value);
            if hash < min {
                min = hash;
            }
        }
        out.push(min);
    }
    out
}

/// Marks, for each window, whether its minimum differs from the previous
/// window's (i.e. a new minimiser begins there); the first window always
/// begins one.
fn minimiser_begins(minima: &[u64]) -> Vec<bool> {
    let mut out = vec![false; minima.len()];
    if let Some(first) = out.first_mut() {
        *first = true;
    }
    for i in 1..minima.len() {
        out[i] = minima[i] != minima[i - 1];
    }
    out
}

/// Estimates, via Monte Carlo, how often a single substitution error flips
/// the minimiser-begin status of a window it does not directly overlap.
/// Returns log-probabilities indexed by the number of affected windows,
/// length `window_size + 1`.
pub fn one_indirect_error_model(query_length: usize, window_size: usize, shape: &Shape) -> Vec<f64> {
    let kmer_size = shape.size() as usize;
    let max_minimisers = query_length - window_size + 1;
    let mut result = vec![0u64; window_size + 1];
    let mut rng = SplitMix64::new(SEED);

    for _ in 0..ITERATIONS {
        let sequence: Vec<u8> = (0..query_length).map(|_| rng.next_base()).collect();
        let begins = minimiser_begins(&window_minima(&sequence, shape, window_size));

        let error_position = rng.next_range(query_length);
        let mut mutated = sequence.clone();
        let original = mutated[error_position];
        loop {
            let candidate = rng.next_base();
            if candidate != original {
                mutated[error_position] = candidate;
                break;
            }
        }
        let begins_after = minimiser_begins(&window_minima(&mutated, shape, window_size));

        let mut affected = 0usize;
        for i in 0..max_minimisers {
            if begins[i] != begins_after[i]
                && (error_position < i || i + kmer_size < error_position)
            {
                affected += 1;
            }
        }
        let slot = affected.min(window_size);
        result[slot] += 1;
    }

    let log_iterations = (ITERATIONS as f64).ln();
    result
        .into_iter()
        .map(|count| if count == 0 { f64::NEG_INFINITY } else { (count as f64).ln() - log_iterations })
        .collect()
}

/// Combines the closed-form probability that a substitution falls inside
/// `i` of the `kmer_size` informative positions with the indirect-effect
/// calibration, yielding log-probabilities indexed by total affected
/// minimisers (length `window_size + 1`, `window_size =
/// affected_by_one_error_indirectly_prob.len() - 1`).
pub fn one_error_model(
    kmer_size: usize,
    p_mean: f64,
    affected_by_one_error_indirectly_prob: &[f64],
) -> Vec<f64> {
    let window_size = affected_by_one_error_indirectly_prob.len() - 1;
    let coefficients = pascal_row(kmer_size);
    let inv_p_mean = logspace::substract(0.0, p_mean);
    let mut probabilities = vec![f64::NEG_INFINITY; window_size + 1];

    for i in 0..=kmer_size {
        let p_direct = coefficients[i] + i as f64 * p_mean + (kmer_size - i) as f64 * inv_p_mean;
        for j in 0..=(window_size.saturating_sub(i)) {
            if i + j > window_size {
                break;
            }
            probabilities[i + j] =
                logspace::add(probabilities[i + j], p_direct + affected_by_one_error_indirectly_prob[j]);
        }
    }

    let total = logspace::sum(&probabilities);
    probabilities.iter_mut().for_each(|p| *p -= total);
    probabilities
}

fn enumerate(remaining: usize, probs: &[f64], assigned: &mut [usize], idx: usize, acc: &mut f64) {
    if idx == assigned.len() {
        if remaining != 0 {
            return;
        }
        let mut total = 0.0;
        for &a in assigned.iter() {
            total += probs[a];
        }
        *acc = logspace::add(*acc, total);
        return;
    }
    let window_size = probs.len() - 1;
    for i in 0..=remaining.min(window_size) {
        assigned[idx] = i;
        enumerate(remaining - i, probs, assigned, idx + 1, acc);
    }
}

/// Convolves `errors` independent copies of the single-error model to get
/// the probability distribution of total affected minimisers when `errors`
/// substitutions land independently, given `number_of_minimisers` observed
/// minimisers this query produced.
pub fn multiple_error_model(
    number_of_minimisers: usize,
    errors: usize,
    affected_by_one_error_prob: &[f64],
) -> Vec<f64> {
    let window_size = affected_by_one_error_prob.len() - 1;
    let max_affected = (errors * window_size).min(number_of_minimisers);
    let mut affected = vec![0.0f64; max_affected + 1];

    for (i, slot) in affected.iter_mut().enumerate() {
        let mut assigned = vec![0usize; errors];
        let mut result = f64::NEG_INFINITY;
        enumerate(i, affected_by_one_error_prob, &mut assigned, 0, &mut result);
        *slot = result;
    }

    let total = logspace::sum(&affected);
    affected.iter_mut().for_each(|p| *p -= total);
    affected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_model_probabilities_sum_to_one() {
        let shape = Shape::ungapped(8);
        let probs = one_indirect_error_model(40, 16, &shape);
        assert_eq!(probs.len(), 17);
        let total: f64 = probs.iter().filter(|p| p.is_finite()).map(|p| p.exp()).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn indirect_model_rarely_affects_far_windows() {
        let shape = Shape::ungapped(8);
        let probs = one_indirect_error_model(60, 16, &shape);
        // Affecting many windows at once from one substitution should be
        // much less likely than affecting zero or one.
        assert!(probs[0] > probs[probs.len() - 1]);
    }

    #[test]
    fn one_error_model_normalizes() {
        let indirect = vec![0.0f64.ln(), f64::NEG_INFINITY, f64::NEG_INFINITY];
        let probs = one_error_model(4, 0.5f64.ln(), &indirect);
        let total: f64 = probs.iter().filter(|p| p.is_finite()).map(|p| p.exp()).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn multiple_error_model_normalizes() {
        let one_error = vec![0.6f64.ln(), 0.3f64.ln(), 0.1f64.ln()];
        let probs = multiple_error_model(10, 2, &one_error);
        let total: f64 = probs.iter().filter(|p| p.is_finite()).map(|p| p.exp()).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn multiple_error_model_caps_at_minimiser_count() {
        let one_error = vec![0.6f64.ln(), 0.3f64.ln(), 0.1f64.ln()];
        let probs = multiple_error_model(2, 3, &one_error);
        assert_eq!(probs.len(), 3); // min(3*2, 2) + 1
    }
}
