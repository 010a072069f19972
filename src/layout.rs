//! Layout-driven HIBF builder (spec C13): a layout file fixes the tree
//! shape (which technical bins are merged, how many live at each level) so
//! that build is a single bottom-up pass — hash every user bin's input
//! once, size each IBF from what its subtree actually holds, allocate, and
//! emplace.
//!
//! Layout file format: a `##CONFIG` block of single-line JSON carrying the
//! build-time parameters, then one line per user bin:
//! `files<TAB>tb_index_stack<TAB>tb_count_stack`, where `files` is a
//! semicolon-separated list of input paths merged into one user bin, and the
//! two stacks are comma-separated, root-to-leaf: `tb_index_stack[d]` is the
//! technical bin this user bin occupies at tree depth `d`, `tb_count_stack[d]`
//! is the number of technical bins the IBF at depth `d` was laid out with.
//! All but the last element of a stack pair describe a merged (interior)
//! bin; the last is the leaf.

use crate::error::{IoContext, RaptorError, Result};
use crate::estimate::{merged_bin_width_for, BinSizeEstimator};
use crate::hibf::{Hibf, DELETED, MERGED};
use crate::ibf::InterleavedBloomFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use seqkmer::Shape;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub window_size: usize,
    pub shape_mask: u64,
    pub shape_size: u8,
    pub hash_count: usize,
    pub fpr: f64,
}

struct LayoutEntry {
    files: Vec<PathBuf>,
    tb_index_stack: Vec<usize>,
    tb_count_stack: Vec<usize>,
}

fn parse_stack(field: &str) -> Result<Vec<usize>> {
    field
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| RaptorError::Parse(format!("not an integer: {s:?}")))
        })
        .collect()
}

fn parse_layout(path: &Path) -> Result<(LayoutConfig, Vec<LayoutEntry>)> {
    let file = std::fs::File::open(path).with_path(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| RaptorError::Parse("empty layout file".into()))?
        .with_path(path)?;
    let header = header
        .strip_prefix("##CONFIG:")
        .ok_or_else(|| RaptorError::Parse("layout file missing ##CONFIG: header".into()))?;
    let config: LayoutConfig =
        serde_json::from_str(header).map_err(|e| RaptorError::Parse(format!("bad layout config: {e}")))?;

    let mut entries = Vec::new();
    for line in lines {
        let line = line.with_path(path)?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(RaptorError::Parse(format!("expected 3 tab-separated fields, got {}", fields.len())));
        }
        let files = fields[0].split(';').map(PathBuf::from).collect();
        let tb_index_stack = parse_stack(fields[1])?;
        let tb_count_stack = parse_stack(fields[2])?;
        if tb_index_stack.len() != tb_count_stack.len() || tb_index_stack.is_empty() {
            return Err(RaptorError::Parse("tb_index_stack and tb_count_stack must be equal length and non-empty".into()));
        }
        entries.push(LayoutEntry { files, tb_index_stack, tb_count_stack });
    }
    Ok((config, entries))
}

/// Hashes every record across `files` into the sorted, deduplicated
/// minimiser set via the C3 file reader façade, which dispatches each file
/// to the sequence or `.minimiser` variant by extension.
pub fn hash_files(files: &[PathBuf], shape: &Shape, window_size: usize) -> Result<Vec<u64>> {
    let mut hashes = Vec::new();
    for path in files {
        seqkmer::hash_into_auto(path, shape, window_size, &mut hashes).with_path(path)?;
    }
    hashes.sort_unstable();
    hashes.dedup();
    Ok(hashes)
}

/// Builds an HIBF from a layout file, hashing every referenced input file
/// exactly once and sizing each IBF from the exact cardinality of its
/// largest bin (C7), correcting merged-bin widths for the number of leaves
/// folded into them.
pub fn build_from_layout(path: &Path) -> Result<(Hibf, LayoutConfig)> {
    let (config, entries) = parse_layout(path)?;
    let shape = Shape::new(config.shape_mask, config.shape_size);

    let mut hibf = Hibf::new(config.hash_count, config.fpr);
    // node_of[(depth, path-so-far)] isn't addressable by path alone since
    // multiple user bins can share a prefix; key nodes by (parent_node,
    // parent_bin) instead, which is unique per tree position.
    let mut node_at: HashMap<(usize, usize), usize> = HashMap::new();
    // leaf_hashes[node][bin] accumulates hashes for every leaf bin so sizing
    // can look at exact content before allocating the final-width IBF.
    let mut leaf_hashes: HashMap<(usize, usize), Vec<u64>> = HashMap::new();
    // Tracks how many leaves are folded under a merged bin, for the FPR
    // correction in a merged bin's width.
    let mut leaves_under: HashMap<(usize, usize), usize> = HashMap::new();

    for entry in &entries {
        let hashes = hash_files(&entry.files, &shape, config.window_size)?;

        let mut parent_node = Hibf::ROOT;
        let mut parent_bin = 0usize;
        let mut ensured_root = false;

        for depth in 0..entry.tb_index_stack.len() {
            let bin = entry.tb_index_stack[depth];
            let bin_count = entry.tb_count_stack[depth];
            let is_leaf = depth == entry.tb_index_stack.len() - 1;

            let node = if depth == 0 {
                if !ensured_root {
                    if hibf.ibf_vector.is_empty() {
                        let placeholder = InterleavedBloomFilter::new(bin_count, 64, config.hash_count);
                        hibf.push_node(placeholder, (0, 0));
                    }
                    ensured_root = true;
                }
                Hibf::ROOT
            } else {
                *node_at.entry((parent_node, parent_bin)).or_insert_with(|| {
                    let placeholder = InterleavedBloomFilter::new(bin_count, 64, config.hash_count);
                    hibf.push_node(placeholder, (parent_node, parent_bin))
                })
            };

            if is_leaf {
                let ub_id = hibf.user_bins.push(
                    entry
                        .files
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(";"),
                );
                hibf.mark_leaf(node, bin, ub_id);
                leaf_hashes.insert((node, bin), hashes.clone());
            } else {
                *leaves_under.entry((node, bin)).or_insert(0) += 1;
            }

            parent_node = node;
            parent_bin = bin;
        }
    }

    // Mark any bin that never received an explicit entry (a merged bin
    // whose child was addressed separately) once children are all known.
    for (&(parent_node, parent_bin), &child) in &node_at {
        hibf.mark_merged(parent_node, parent_bin, child);
    }

    // A bin the layout never addressed keeps push_node's default MERGED
    // self-loop; that would recurse into itself forever during a query, so
    // treat it as unused.
    for node in 0..hibf.ibf_vector.len() {
        let bin_count = hibf.ibf_vector[node].bin_count();
        for bin in 0..bin_count {
            if hibf.ibf_bin_to_user_bin_id[node][bin] == MERGED && hibf.next_ibf_id[node][bin] == node {
                hibf.ibf_bin_to_user_bin_id[node][bin] = DELETED;
            }
        }
    }

    size_and_fill(&mut hibf, &leaf_hashes, &leaves_under, config.hash_count, config.fpr);

    Ok((hibf, config))
}

/// Sizes every IBF from the exact cardinality of its fullest bin (recounted
/// from the hashes gathered above, not approximated — the layout step
/// already paid for reading every file once) and replaces each placeholder
/// filter with one of the right width, emplacing its content.
fn size_and_fill(
    hibf: &mut Hibf,
    leaf_hashes: &HashMap<(usize, usize), Vec<u64>>,
    leaves_under: &HashMap<(usize, usize), usize>,
    hash_count: usize,
    fpr: f64,
) {
    for node in 0..hibf.ibf_vector.len() {
        let bin_count = hibf.ibf_vector[node].bin_count();
        let mut estimator = BinSizeEstimator::new(bin_count);
        for bin in 0..bin_count {
            if let Some(hashes) = leaf_hashes.get(&(node, bin)) {
                for &h in hashes {
                    estimator.insert(bin, h);
                }
            }
        }
        let max_bin = estimator.max_bin();
        let exact_count = leaf_hashes
            .get(&(node, max_bin))
            .map(|h| h.len() as u64)
            .unwrap_or(0);
        let split_count = leaves_under.get(&(node, max_bin)).copied().unwrap_or(1).max(1);
        let width = merged_bin_width_for(exact_count, hash_count, fpr, split_count).max(64);

        let rebuilt = InterleavedBloomFilter::new(bin_count, width, hash_count);
        for bin in 0..bin_count {
            if let Some(hashes) = leaf_hashes.get(&(node, bin)) {
                for &h in hashes {
                    rebuilt.emplace(h, bin);
                }
            }
        }
        hibf.ibf_vector[node] = rebuilt;
    }
}
