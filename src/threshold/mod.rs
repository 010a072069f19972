//! Probabilistic threshold engine (spec C10): decides, per query, the
//! minimum number of distinct minimiser hits an IBF bin needs before it
//! counts as a candidate match.
//!
//! Three modes, chosen once per search run, in priority order:
//!
//! 1. **Percentage** — caller fixes a fraction of the query's own minimiser
//!    count directly.
//! 2. **K-mer lemma** — exact, closed form, applies only when `window ==
//!    shape size` (no minimiser compression, so the classic k-mer lemma
//!    holds without approximation).
//! 3. **Probabilistic** — the general case. Precomputes, once per (query
//!    length, window, shape, error count, tau) tuple, a threshold and an FPR
//!    correction indexed by observed minimiser count.

mod correction;
mod logspace;
mod models;
mod pascal_row;
mod precompute;

pub use correction::precompute_correction;
pub use precompute::precompute_threshold;

use seqkmer::Shape;
use std::path::Path;

enum Kind {
    Percentage(f64),
    Lemma(usize),
    Probabilistic {
        min_count: usize,
        thresholds: Vec<usize>,
        correction: Vec<usize>,
    },
}

/// A threshold policy fixed for one search run; `get` is cheap, so it is
/// called once per query.
pub struct ThresholdEngine {
    kind: Kind,
}

impl ThresholdEngine {
    /// `threshold_percentage * minimiser_count`, floored at 1.
    pub fn percentage(threshold_percentage: f64) -> Self {
        assert!(
            threshold_percentage > 0.0 && threshold_percentage <= 1.0,
            "threshold percentage must be in (0, 1]"
        );
        Self { kind: Kind::Percentage(threshold_percentage) }
    }

    /// Applies only when the caller has already confirmed `window ==
    /// shape.size()`; see spec C10.
    pub fn lemma(query_length: usize, errors: usize, kmer_size: usize) -> Self {
        let minuend = query_length + 1;
        let subtrahend = (errors + 1) * kmer_size;
        let value = minuend.saturating_sub(subtrahend).max(1);
        Self { kind: Kind::Lemma(value) }
    }

    /// Builds (or loads from cache) the full probabilistic threshold table.
    #[allow(clippy::too_many_arguments)]
    pub fn probabilistic(
        query_length: usize,
        window_size: usize,
        shape: &Shape,
        errors: usize,
        tau: f64,
        fpr: f64,
        p_max: f64,
        cache_dir: Option<&Path>,
    ) -> Self {
        let kmer_size = shape.size() as usize;
        assert!(window_size > kmer_size, "probabilistic mode requires window > shape size");
        let kmers_per_window = window_size - kmer_size + 1;
        let kmers_per_pattern = query_length - kmer_size + 1;
        let min_count = kmers_per_pattern / kmers_per_window;

        let thresholds = precompute::load_or_compute(
            cache_dir,
            query_length,
            window_size,
            shape,
            errors,
            tau,
        );
        let correction = correction::load_or_compute(
            cache_dir,
            query_length,
            window_size,
            shape,
            fpr,
            p_max,
        );
        Self { kind: Kind::Probabilistic { min_count, thresholds, correction } }
    }

    /// The minimum number of matching minimisers required, given that this
    /// query produced `minimiser_count` distinct minimisers.
    pub fn get(&self, minimiser_count: usize) -> usize {
        match &self.kind {
            Kind::Percentage(phi) => ((minimiser_count as f64 * phi) as usize).max(1),
            Kind::Lemma(value) => *value,
            Kind::Probabilistic { min_count, thresholds, correction } => {
                let max_count = min_count + thresholds.len() - 1;
                let clamped = minimiser_count.clamp(*min_count, max_count);
                let idx = clamped - min_count;
                (thresholds[idx] as isize + correction[idx] as isize).max(1) as usize
            }
        }
    }
}
