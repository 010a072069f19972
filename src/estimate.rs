//! Bin-size estimator (spec C7): approximates per-bin cardinalities with
//! HyperLogLog, then combines an exact recount of the largest bin with the
//! classical Bloom-filter sizing formula to pick a bin width.

use hyperloglogplus::{HyperLogLog, HyperLogLogPlus};
use std::collections::hash_map::RandomState;

/// 15 register bits, matching the ~0.8% standard error the spec calls for.
const HLL_PRECISION: u8 = 15;

pub struct BinSizeEstimator {
    registers: Vec<HyperLogLogPlus<u64, RandomState>>,
}

impl BinSizeEstimator {
    pub fn new(bin_count: usize) -> Self {
        let registers = (0..bin_count)
            .map(|_| {
                HyperLogLogPlus::new(HLL_PRECISION, RandomState::new())
                    .expect("valid HyperLogLog precision")
            })
            .collect();
        Self { registers }
    }

    pub fn insert(&mut self, bin: usize, hash: u64) {
        self.registers[bin].insert(&hash);
    }

    /// Approximate distinct-minimiser count per bin.
    pub fn estimates(&mut self) -> Vec<u64> {
        self.registers.iter_mut().map(|r| r.count().round() as u64).collect()
    }

    /// Index of the bin with the largest approximate cardinality; this is
    /// the only bin worth exactly recounting.
    pub fn max_bin(&mut self) -> usize {
        self.estimates()
            .into_iter()
            .enumerate()
            .max_by_key(|&(_, count)| count)
            .map(|(bin, _)| bin)
            .unwrap_or(0)
    }
}

/// Classical Bloom-filter sizing: the bin width needed so `n` inserted
/// elements with `h` hash functions meet `fpr`.
///
/// `w_b = ceil(-(n*h) / ln(1 - fpr^(1/h)))`
pub fn bin_width_for(exact_count: u64, hash_count: usize, fpr: f64) -> usize {
    assert!(fpr > 0.0 && fpr < 1.0, "fpr must be in (0, 1)");
    if exact_count == 0 {
        return 1;
    }
    let h = hash_count as f64;
    let n = exact_count as f64;
    let denom = (1.0 - fpr.powf(1.0 / h)).ln();
    (-(n * h) / denom).ceil().max(1.0) as usize
}

/// Multiplier applied to a merged bin's width so the combined per-query FPR
/// across `split_count` technical bins still meets `fpr`.
///
/// `correction = ln(1 - (1 - (1 - fpr)^P)^(1/h)) / ln(1 - fpr^(1/h))`
pub fn merged_bin_correction(fpr: f64, hash_count: usize, split_count: usize) -> f64 {
    assert!(fpr > 0.0 && fpr < 1.0);
    if split_count <= 1 {
        return 1.0;
    }
    let h = hash_count as f64;
    let p = split_count as f64;
    let numerator = (1.0 - (1.0 - (1.0 - fpr).powf(p)).powf(1.0 / h)).ln();
    let denominator = (1.0 - fpr.powf(1.0 / h)).ln();
    numerator / denominator
}

/// Bin width for a merged bin spanning `split_count` technical bins.
pub fn merged_bin_width_for(exact_count: u64, hash_count: usize, fpr: f64, split_count: usize) -> usize {
    let base = bin_width_for(exact_count, hash_count, fpr) as f64;
    (base * merged_bin_correction(fpr, hash_count, split_count)).ceil().max(1.0) as usize
}
