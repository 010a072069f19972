//! Flat-IBF build driver: turns a bin-path list (one user bin per line,
//! semicolon-separated files within a bin) into a single-level index —
//! an `Hibf` with one root node and no merged bins — optionally sharded
//! across `parts` independent partitions by hash prefix (C6).

use crate::error::{IoContext, RaptorError, Result};
use crate::estimate::{bin_width_for, BinSizeEstimator};
use crate::hibf::Hibf;
use crate::ibf::InterleavedBloomFilter;
use crate::layout::hash_files;
use crate::partition::partition_of;
use crate::serialize::IndexParams;
use seqkmer::Shape;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Emplaces one user bin's hashes into `ibf`. With a single partition every
/// hash the bin's files produce belongs to it; with `parts > 1` each file is
/// re-read through the predicate-filtered façade (C3's `hash_into_if`, the
/// form spec'd for the partitioner) so only this shard's hashes are ever
/// materialized, instead of filtering an already-collected `Vec` per shard.
fn emplace_partition(
    ibf: &InterleavedBloomFilter,
    files: &[PathBuf],
    shape: &Shape,
    window_size: usize,
    bin: usize,
    parts: usize,
    part: usize,
) -> Result<()> {
    for path in files {
        seqkmer::for_each_hash_auto_if(
            path,
            shape,
            window_size,
            |h| parts == 1 || partition_of(h, parts) == part,
            |h| ibf.emplace(h, bin),
        )
        .with_path(path)?;
    }
    Ok(())
}

pub struct BuildParams {
    pub window_size: usize,
    pub shape: Shape,
    pub fpr: f64,
    pub hash_count: usize,
    pub parts: usize,
}

fn parse_bin_list(path: &Path) -> Result<Vec<(String, Vec<PathBuf>)>> {
    let file = std::fs::File::open(path).with_path(path)?;
    let reader = std::io::BufReader::new(file);
    let mut bins = Vec::new();
    for line in reader.lines() {
        let line = line.with_path(path)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let files: Vec<PathBuf> = line.split(';').map(PathBuf::from).collect();
        let name = line.to_string();
        bins.push((name, files));
    }
    if bins.is_empty() {
        return Err(RaptorError::Parse(format!("{}: no user bins declared", path.display())));
    }
    Ok(bins)
}

/// Builds a flat (single-level) index from a bin-path list file and writes
/// it to `output` (sharded across `params.parts` files if `parts > 1`).
pub fn build_flat_index(input: &Path, output: &Path, params: &BuildParams) -> Result<()> {
    let bins = parse_bin_list(input)?;
    let bin_count = bins.len();

    let mut per_bin_hashes = Vec::with_capacity(bin_count);
    for (_, files) in &bins {
        per_bin_hashes.push(hash_files(files, &params.shape, params.window_size)?);
    }

    let parts = params.parts.max(1);
    let mut estimator = BinSizeEstimator::new(bin_count);
    for (bin, hashes) in per_bin_hashes.iter().enumerate() {
        for &h in hashes {
            estimator.insert(bin, h);
        }
    }
    let max_bin = estimator.max_bin();
    let exact_count = per_bin_hashes[max_bin].len() as u64;
    let width = bin_width_for(exact_count, params.hash_count, params.fpr).max(64);

    let mut hibfs = Vec::with_capacity(parts);
    for part in 0..parts {
        let mut hibf = Hibf::new(params.hash_count, params.fpr);
        let ibf = InterleavedBloomFilter::new(bin_count, width, params.hash_count);
        let root = hibf.push_node(ibf, (0, 0));
        for (bin, (name, files)) in bins.iter().enumerate() {
            let ub_id = hibf.user_bins.push(name.clone());
            hibf.mark_leaf(root, bin, ub_id);
            emplace_partition(&hibf.ibf_vector[root], files, &params.shape, params.window_size, bin, parts, part)?;
        }
        hibfs.push(hibf);
    }

    let index_params = IndexParams {
        window_size: params.window_size,
        shape: params.shape,
        partition_count: parts,
        fpr: params.fpr,
    };
    crate::serialize::write_index(output, &hibfs, &index_params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fasta(dir: &Path, name: &str, seq: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, ">r1").unwrap();
        writeln!(f, "{seq}").unwrap();
        path
    }

    #[test]
    fn builds_a_single_shard_index() {
        let dir = tempfile::tempdir().unwrap();
        let fa_a = write_fasta(dir.path(), "a.fasta", "ACGTACGTTGCATGCATGCAACGTACGTTGCATGCATGCA");
        let fa_b = write_fasta(dir.path(), "b.fasta", "TTTTGGGGCCCCAAAATTTTGGGGCCCCAAAATTTTGGGG");

        let list_path = dir.path().join("bins.txt");
        std::fs::write(&list_path, format!("{}\n{}\n", fa_a.display(), fa_b.display())).unwrap();

        let output = dir.path().join("index.raptor");
        let params = BuildParams { window_size: 12, shape: Shape::ungapped(8), fpr: 0.05, hash_count: 2, parts: 1 };
        build_flat_index(&list_path, &output, &params).unwrap();

        let (hibf, _) = crate::serialize::read_index(&output).unwrap();
        assert_eq!(hibf.user_bins.filename_of.len(), 2);
    }

    #[test]
    fn builds_partitioned_shards() {
        let dir = tempfile::tempdir().unwrap();
        let fa_a = write_fasta(dir.path(), "a.fasta", "ACGTACGTTGCATGCATGCAACGTACGTTGCATGCATGCA");
        let list_path = dir.path().join("bins.txt");
        std::fs::write(&list_path, format!("{}\n", fa_a.display())).unwrap();

        let output = dir.path().join("index.raptor");
        let params = BuildParams { window_size: 12, shape: Shape::ungapped(8), fpr: 0.05, hash_count: 2, parts: 2 };
        build_flat_index(&list_path, &output, &params).unwrap();

        let shards = crate::serialize::read_partitioned_index(&output, 2).unwrap();
        assert_eq!(shards.len(), 2);
    }
}
