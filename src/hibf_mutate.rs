//! Online HIBF mutation (spec C9): deleting a set of user bins in one pass,
//! cascading tombstones up the tree, and inserting new user bins into
//! reclaimed technical bins.
//!
//! Insertion policy (spec leaves the technical-bin-layout choice to the
//! implementer, §9 Open Questions): a new UB is placed into the first
//! `DELETED` leaf bin found in the target IBF. If none is free, the caller
//! must rebuild via the layout consumer (C13) to grow capacity; this
//! function reports that case as an error rather than silently growing the
//! filter, since bin width and hash seeds are fixed at first build.

use crate::hibf::{Hibf, DELETED, MERGED};
use std::collections::HashSet;

/// Clears every technical bin whose user bin is in `targets`, then cascades
/// the cleanup upward: an IBF all of whose bins end up `DELETED` causes its
/// parent bin to be cleared and marked `DELETED` too.
pub fn delete_user_bins(hibf: &mut Hibf, targets: &HashSet<u64>) {
    delete_node(hibf, Hibf::ROOT, targets);
}

/// Returns whether every bin of `node` is `DELETED` after this pass.
fn delete_node(hibf: &mut Hibf, node: usize, targets: &HashSet<u64>) -> bool {
    let bin_count = hibf.ibf_vector[node].bin_count();
    for bin in 0..bin_count {
        match hibf.ibf_bin_to_user_bin_id[node][bin] {
            DELETED => continue,
            MERGED => {
                let child = hibf.next_ibf_id[node][bin];
                if delete_node(hibf, child, targets) {
                    hibf.ibf_vector[node].clear(bin);
                    hibf.ibf_bin_to_user_bin_id[node][bin] = DELETED;
                }
            }
            ub if targets.contains(&ub) => {
                hibf.ibf_vector[node].clear(bin);
                hibf.ibf_bin_to_user_bin_id[node][bin] = DELETED;
            }
            _ => {}
        }
    }
    (0..bin_count).all(|bin| hibf.ibf_bin_to_user_bin_id[node][bin] == DELETED)
}

#[derive(Debug)]
pub enum InsertError {
    NoFreeBin { node: usize },
}

impl std::fmt::Display for InsertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertError::NoFreeBin { node } => {
                write!(f, "no free technical bin in IBF {node} for insertion; rebuild via layout")
            }
        }
    }
}

impl std::error::Error for InsertError {}

/// Inserts a new user bin into the first reclaimed (`DELETED`) leaf bin of
/// `node`, hashing `hashes` into it. Returns the new UB id.
pub fn insert_user_bin(
    hibf: &mut Hibf,
    node: usize,
    name: String,
    hashes: &[u64],
) -> Result<u64, InsertError> {
    let bin_count = hibf.ibf_vector[node].bin_count();
    let bin = (0..bin_count)
        .find(|&b| hibf.ibf_bin_to_user_bin_id[node][b] == DELETED)
        .ok_or(InsertError::NoFreeBin { node })?;

    let ub_id = hibf.user_bins.push(name);
    for &hash in hashes {
        hibf.ibf_vector[node].emplace(hash, bin);
    }
    hibf.mark_leaf(node, bin, ub_id);
    Ok(ub_id)
}
