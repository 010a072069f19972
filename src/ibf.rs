//! Interleaved Bloom Filter (spec C5): a fixed-size, B-binned Bloom filter
//! with SIMD-friendly bulk membership.
//!
//! Storage is row-major: `w_b` rows of `B` bits each, each row packed into
//! `words_per_row = ceil(B / 64)` words. Row `r`, bin `b` lives at bit `b %
//! 64` of word `r * words_per_row + b / 64`. Membership counting AND-reduces
//! the `h` rows touched by a hash, word by word, so one machine word tests 64
//! bins at once.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Pseudo-random odd constants mixed into the hash before reducing to a row.
/// Fixed across build and search so an index is self-consistent; not secret.
const HASH_SEEDS: [u64; 5] = [
    0x9E3779B97F4A7C15,
    0xC2B2AE3D27D4EB4F,
    0x165667B19E3779F9,
    0x27D4EB2F165667C5,
    0xFF51AFD7ED558CCD,
];

#[inline]
fn fast_reduce(x: u64, n: u64) -> u64 {
    (((x as u128) * (n as u128)) >> 64) as u64
}

pub struct InterleavedBloomFilter {
    bin_count: usize,
    bin_width: usize,
    hash_count: usize,
    words_per_row: usize,
    bits: Vec<AtomicU64>,
    occ: Vec<AtomicU32>,
}

impl InterleavedBloomFilter {
    /// Allocates `bin_count * bin_width` bits, zeroed.
    pub fn new(bin_count: usize, bin_width: usize, hash_count: usize) -> Self {
        assert!(bin_count > 0, "bin_count must be positive");
        assert!(bin_width > 0, "bin_width must be positive");
        assert!((1..=5).contains(&hash_count), "hash_count must be in 1..=5");
        let words_per_row = bin_count.div_ceil(64);
        let bits = (0..bin_width * words_per_row).map(|_| AtomicU64::new(0)).collect();
        let occ = (0..bin_count).map(|_| AtomicU32::new(0)).collect();
        Self { bin_count, bin_width, hash_count, words_per_row, bits, occ }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn bin_width(&self) -> usize {
        self.bin_width
    }

    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    pub fn bit_size(&self) -> usize {
        self.bin_count * self.bin_width
    }

    pub fn occupancy(&self, bin: usize) -> u32 {
        self.occ[bin].load(Ordering::Relaxed)
    }

    #[inline]
    fn row_of(&self, hash: u64, i: usize) -> usize {
        fast_reduce(hash.wrapping_mul(HASH_SEEDS[i]), self.bin_width as u64) as usize
    }

    #[inline]
    fn word_index(&self, row: usize, bin: usize) -> usize {
        row * self.words_per_row + bin / 64
    }

    /// Sets the bit for `bin` in each of the `h` rows selected by `hash`.
    /// Safe to call concurrently for disjoint bins sharing a word: the OR is
    /// atomic, so no update is lost.
    pub fn emplace(&self, hash: u64, bin: usize) {
        assert!(bin < self.bin_count, "bin out of range");
        for i in 0..self.hash_count {
            let row = self.row_of(hash, i);
            let word_idx = self.word_index(row, bin);
            let mask = 1u64 << (bin % 64);
            self.bits[word_idx].fetch_or(mask, Ordering::Relaxed);
        }
        self.occ[bin].fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes column `bin` across every row and resets its occupancy.
    pub fn clear(&self, bin: usize) {
        assert!(bin < self.bin_count, "bin out of range");
        let mask = !(1u64 << (bin % 64));
        for row in 0..self.bin_width {
            let word_idx = self.word_index(row, bin);
            self.bits[word_idx].fetch_and(mask, Ordering::Relaxed);
        }
        self.occ[bin].store(0, Ordering::Relaxed);
    }

    /// Returns the `[0, B)` counting vector: for each hash, 1 is added to
    /// every bin whose row bit is set for all `h` hash functions.
    pub fn bulk_count(&self, hashes: &[u64]) -> Vec<u16> {
        let mut counts = vec![0u16; self.bin_count];
        let mut reduced = vec![0u64; self.words_per_row];
        for &hash in hashes {
            reduced.iter_mut().for_each(|w| *w = u64::MAX);
            for i in 0..self.hash_count {
                let row = self.row_of(hash, i);
                let base = row * self.words_per_row;
                for (w, word) in reduced.iter_mut().zip(&self.bits[base..base + self.words_per_row]) {
                    *w &= word.load(Ordering::Relaxed);
                }
            }
            for (word_idx, &word) in reduced.iter().enumerate() {
                let mut word = word;
                while word != 0 {
                    let bit = word.trailing_zeros() as usize;
                    let bin = word_idx * 64 + bit;
                    if bin < self.bin_count {
                        counts[bin] = counts[bin].saturating_add(1);
                    }
                    word &= word - 1;
                }
            }
        }
        counts
    }

    /// Bins whose bulk count meets or exceeds `tau`, ascending.
    pub fn membership_for(&self, hashes: &[u64], tau: u16) -> Vec<usize> {
        self.bulk_count(hashes)
            .into_iter()
            .enumerate()
            .filter(|&(_, count)| count >= tau)
            .map(|(bin, _)| bin)
            .collect()
    }

    /// Snapshot of the raw bit words, used by the serializer (C11).
    pub fn bits_snapshot(&self) -> Vec<u64> {
        self.bits.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }

    pub fn occupancy_snapshot(&self) -> Vec<u32> {
        self.occ.iter().map(|o| o.load(Ordering::Relaxed)).collect()
    }

    /// Reconstructs a filter from a previously-snapshotted bit/occupancy pair.
    pub fn from_parts(
        bin_count: usize,
        bin_width: usize,
        hash_count: usize,
        bits: Vec<u64>,
        occ: Vec<u32>,
    ) -> Self {
        let words_per_row = bin_count.div_ceil(64);
        assert_eq!(bits.len(), bin_width * words_per_row, "bit vector size mismatch");
        assert_eq!(occ.len(), bin_count, "occupancy vector size mismatch");
        Self {
            bin_count,
            bin_width,
            hash_count,
            words_per_row,
            bits: bits.into_iter().map(AtomicU64::new).collect(),
            occ: occ.into_iter().map(AtomicU32::new).collect(),
        }
    }
}
