//! Hierarchical IBF (spec C8): a forest with one root (IBF 0). Interior bins
//! are "merged" — their content is the union of everything beneath a child
//! IBF — so a miss at a merged bin safely prunes the whole subtree.

use crate::ibf::InterleavedBloomFilter;

/// `ibf_bin_to_user_bin_id` sentinel: this TB is a merged (interior) bin.
pub const MERGED: u64 = u64::MAX;
/// `ibf_bin_to_user_bin_id` sentinel: this TB has been deleted.
pub const DELETED: u64 = u64::MAX - 1;

pub struct UserBins {
    pub filename_of: Vec<String>,
}

impl UserBins {
    pub fn new() -> Self {
        Self { filename_of: Vec::new() }
    }

    pub fn push(&mut self, name: String) -> u64 {
        self.filename_of.push(name);
        (self.filename_of.len() - 1) as u64
    }
}

impl Default for UserBins {
    fn default() -> Self {
        Self::new()
    }
}

/// A tree of IBFs with parent -> child routing; root is index 0, whose
/// `prev_ibf_id` points to itself.
pub struct Hibf {
    pub ibf_vector: Vec<InterleavedBloomFilter>,
    /// `next_ibf_id[n][b]`: child IBF index if bin `b` of IBF `n` is merged,
    /// otherwise `n` itself (a self-loop marks a leaf TB).
    pub next_ibf_id: Vec<Vec<usize>>,
    /// `prev_ibf_id[n]`: (parent_ibf, parent_bin); root's parent is itself.
    pub prev_ibf_id: Vec<(usize, usize)>,
    /// `ibf_bin_to_user_bin_id[n][b]`: a UB id, or `MERGED`/`DELETED`.
    pub ibf_bin_to_user_bin_id: Vec<Vec<u64>>,
    pub user_bins: UserBins,
    pub hash_count: usize,
    pub fpr: f64,
}

impl Hibf {
    pub const ROOT: usize = 0;

    pub fn new(hash_count: usize, fpr: f64) -> Self {
        Self {
            ibf_vector: Vec::new(),
            next_ibf_id: Vec::new(),
            prev_ibf_id: Vec::new(),
            ibf_bin_to_user_bin_id: Vec::new(),
            user_bins: UserBins::new(),
            hash_count,
            fpr,
        }
    }

    /// Appends a new, initially all-leaf IBF node and returns its index.
    pub fn push_node(
        &mut self,
        ibf: InterleavedBloomFilter,
        parent: (usize, usize),
    ) -> usize {
        let bin_count = ibf.bin_count();
        let idx = self.ibf_vector.len();
        self.ibf_vector.push(ibf);
        self.next_ibf_id.push(vec![idx; bin_count]);
        self.ibf_bin_to_user_bin_id.push(vec![MERGED; bin_count]);
        self.prev_ibf_id.push(if idx == Self::ROOT { (idx, 0) } else { parent });
        idx
    }

    pub fn mark_merged(&mut self, node: usize, bin: usize, child: usize) {
        self.next_ibf_id[node][bin] = child;
        self.ibf_bin_to_user_bin_id[node][bin] = MERGED;
    }

    pub fn mark_leaf(&mut self, node: usize, bin: usize, user_bin_id: u64) {
        self.next_ibf_id[node][bin] = node;
        self.ibf_bin_to_user_bin_id[node][bin] = user_bin_id;
    }

    fn is_merged(&self, node: usize, bin: usize) -> bool {
        self.ibf_bin_to_user_bin_id[node][bin] == MERGED
    }

    fn is_deleted(&self, node: usize, bin: usize) -> bool {
        self.ibf_bin_to_user_bin_id[node][bin] == DELETED
    }

    /// Descends from the root, emitting the UB ids of every bin whose count
    /// meets `tau`, collapsing consecutive split bins carrying the same UB
    /// id into one emission.
    pub fn query(&self, hashes: &[u64], tau: u16) -> Vec<u64> {
        let mut hits = Vec::new();
        self.query_node(Self::ROOT, hashes, tau, &mut hits);
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// Queries a hash-partitioned set of shards (spec C6): every shard
    /// shares the same tree topology and bin assignment (only the hash
    /// space was split at build time), so a bin's true hit count is the sum
    /// of its count in every shard. Used instead of `query` whenever the
    /// index was built with `parts > 1`.
    pub fn query_sharded(shards: &[&Hibf], hashes: &[u64], tau: u16) -> Vec<u64> {
        let mut hits = Vec::new();
        shards[0].query_node_sharded(shards, Self::ROOT, hashes, tau, &mut hits);
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    fn query_node_sharded(&self, shards: &[&Hibf], node: usize, hashes: &[u64], tau: u16, hits: &mut Vec<u64>) {
        let bin_count = self.ibf_vector[node].bin_count();
        let mut counts = vec![0u16; bin_count];
        for shard in shards {
            for (total, count) in counts.iter_mut().zip(shard.ibf_vector[node].bulk_count(hashes)) {
                *total = total.saturating_add(count);
            }
        }
        let mut bin = 0;
        while bin < counts.len() {
            if self.is_deleted(node, bin) {
                bin += 1;
                continue;
            }
            if counts[bin] >= tau {
                if self.is_merged(node, bin) {
                    self.query_node_sharded(shards, self.next_ibf_id[node][bin], hashes, tau, hits);
                } else {
                    let ub = self.ibf_bin_to_user_bin_id[node][bin];
                    hits.push(ub);
                    while bin + 1 < counts.len()
                        && !self.is_merged(node, bin + 1)
                        && self.ibf_bin_to_user_bin_id[node][bin + 1] == ub
                    {
                        bin += 1;
                    }
                }
            }
            bin += 1;
        }
    }

    fn query_node(&self, node: usize, hashes: &[u64], tau: u16, hits: &mut Vec<u64>) {
        let counts = self.ibf_vector[node].bulk_count(hashes);
        let mut bin = 0;
        while bin < counts.len() {
            if self.is_deleted(node, bin) {
                bin += 1;
                continue;
            }
            if counts[bin] >= tau {
                if self.is_merged(node, bin) {
                    self.query_node(self.next_ibf_id[node][bin], hashes, tau, hits);
                } else {
                    let ub = self.ibf_bin_to_user_bin_id[node][bin];
                    hits.push(ub);
                    // Collapse consecutive split bins carrying the same UB id.
                    while bin + 1 < counts.len()
                        && !self.is_merged(node, bin + 1)
                        && self.ibf_bin_to_user_bin_id[node][bin + 1] == ub
                    {
                        bin += 1;
                    }
                }
            }
            bin += 1;
        }
    }
}
