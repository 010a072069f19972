//! IBF partitioner (spec C6): splits hashes across `P` independent IBFs by a
//! hash-prefix, so an index too large for one filter can be built and queried
//! in parallel shards.

use crate::ibf::InterleavedBloomFilter;

/// Routes a hash to one of `parts` partitions using a prefix of
/// `2 * ceil(log2(parts))` bits. `parts` must be a power of two.
#[inline]
pub fn partition_of(hash: u64, parts: usize) -> usize {
    assert!(parts.is_power_of_two() && parts > 0, "parts must be a power of two");
    if parts == 1 {
        return 0;
    }
    let log2p = parts.trailing_zeros();
    let bits = 2 * log2p;
    let shift = 64u32.saturating_sub(bits);
    let prefix = if shift >= 64 { hash } else { hash >> shift };
    (prefix % parts as u64) as usize
}

/// A sharded index: `parts` independent IBFs, each with the same bin layout.
/// A query's per-bin count sums across partitions.
pub struct PartitionedIbf {
    pub parts: Vec<InterleavedBloomFilter>,
}

impl PartitionedIbf {
    pub fn new(num_parts: usize, bin_count: usize, bin_width: usize, hash_count: usize) -> Self {
        assert!(num_parts.is_power_of_two());
        let parts = (0..num_parts)
            .map(|_| InterleavedBloomFilter::new(bin_count, bin_width, hash_count))
            .collect();
        Self { parts }
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    pub fn emplace(&self, hash: u64, bin: usize) {
        let p = partition_of(hash, self.parts.len());
        self.parts[p].emplace(hash, bin);
    }

    /// Per-bin counts summed across every partition.
    pub fn bulk_count(&self, hashes: &[u64]) -> Vec<u16> {
        let bin_count = self.parts[0].bin_count();
        let mut grouped: Vec<Vec<u64>> = vec![Vec::new(); self.parts.len()];
        for &hash in hashes {
            grouped[partition_of(hash, self.parts.len())].push(hash);
        }
        let mut totals = vec![0u16; bin_count];
        for (part, part_hashes) in self.parts.iter().zip(grouped.iter()) {
            if part_hashes.is_empty() {
                continue;
            }
            for (total, count) in totals.iter_mut().zip(part.bulk_count(part_hashes)) {
                *total = total.saturating_add(count);
            }
        }
        totals
    }

    pub fn membership_for(&self, hashes: &[u64], tau: u16) -> Vec<usize> {
        self.bulk_count(hashes)
            .into_iter()
            .enumerate()
            .filter(|&(_, count)| count >= tau)
            .map(|(bin, _)| bin)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn partition_of_is_in_range() {
        for hash in [0u64, 1, u64::MAX, 0xDEADBEEF, 123456789] {
            let p = partition_of(hash, 8);
            assert!(p < 8);
        }
    }

    #[test]
    fn union_of_partitions_covers_input_multiset() {
        let hashes: Vec<u64> = (0..5000).map(|i| i * 2654435761).collect();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut buckets = vec![Vec::new(); 4];
        for &h in &hashes {
            buckets[partition_of(h, 4)].push(h);
        }
        for bucket in &buckets {
            seen.extend(bucket.iter().copied());
        }
        assert_eq!(seen.len(), hashes.iter().collect::<HashSet<_>>().len());
    }

    #[test]
    fn single_partition_routes_everything_to_zero() {
        for hash in [0u64, 99, u64::MAX] {
            assert_eq!(partition_of(hash, 1), 0);
        }
    }

    #[test]
    fn partitioned_query_matches_single_shard_insert() {
        let pibf = PartitionedIbf::new(4, 16, 512, 2);
        pibf.emplace(777, 3);
        assert!(pibf.membership_for(&[777], 2).contains(&3));
    }
}
