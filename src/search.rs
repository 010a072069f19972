//! Parallel search driver (spec C12): streams queries in bounded chunks,
//! shuffles each chunk with a fixed seed so pathologically-ordered input
//! (all-same-length, all-same-content runs) doesn't starve some worker
//! threads while others idle, then fans each query out to a rayon thread
//! that hashes it, looks up its threshold, and walks the HIBF.

use crate::error::{IoContext, Result};
use crate::hibf::Hibf;
use crate::rng::SplitMix64;
use crate::threshold::ThresholdEngine;
use rayon::prelude::*;
use seqkmer::{RecordReader, Shape};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Records are shuffled within a chunk this large before dispatch, bounding
/// memory while still breaking up any ordering in the input file.
pub const CHUNK_SIZE: usize = 10_000_000;
const SHUFFLE_SEED: u64 = 0x5EED_F00D_CAFE_1234;

pub struct Query {
    pub name: String,
    pub sequence: Vec<u8>,
}

pub struct QueryHit {
    pub name: String,
    pub user_bins: Vec<u64>,
}

/// Computes the sorted, deduplicated minimiser hashes of `sequence` under
/// `shape`/`window_size`; the same dedup rule as the index build (C2), so a
/// query's distinct-minimiser count is comparable to the threshold tables.
pub fn query_minimisers(sequence: &[u8], shape: &Shape, window_size: usize) -> Vec<u64> {
    let mut hashes = seqkmer::scan_minimisers(sequence, shape, window_size);
    hashes.sort_unstable();
    hashes.dedup();
    hashes
}

/// Reads every record of a FASTA or FASTQ query file into memory via the
/// shared record reader (C3's `RecordReader`, which also backs the sequence
/// file-reader façade); a query workload is expected to fit, unlike a
/// reference collection being indexed.
pub fn read_queries(path: &Path) -> Result<Vec<Query>> {
    let Some(reader) = RecordReader::open(path).with_path(path)? else {
        return Ok(Vec::new());
    };
    reader
        .map(|record| {
            let (name, sequence) = record.with_path(path)?;
            Ok(Query { name, sequence })
        })
        .collect()
}

fn search_one(query: &Query, shape: &Shape, window_size: usize, hibf: &Hibf, threshold: &ThresholdEngine) -> QueryHit {
    let hashes = query_minimisers(&query.sequence, shape, window_size);
    let tau = threshold.get(hashes.len()).min(u16::MAX as usize) as u16;
    let user_bins = hibf.query(&hashes, tau);
    QueryHit { name: query.name.clone(), user_bins }
}

/// Runs every query in `queries` against `hibf`, writing a manifest header
/// (user-bin id to filename mapping and the index parameters) followed by
/// one `#QUERY_NAME<TAB>USER_BINS` line per query, where `USER_BINS` is a
/// sorted, comma-separated list of hit ids.
pub fn run_search(
    mut queries: Vec<Query>,
    shape: &Shape,
    window_size: usize,
    hibf: &Hibf,
    threshold: &ThresholdEngine,
    out_path: &Path,
) -> Result<()> {
    let file = std::fs::File::create(out_path).with_path(out_path)?;
    let writer = Mutex::new(BufWriter::new(file));

    {
        let mut w = writer.lock().unwrap();
        for (id, name) in hibf.user_bins.filename_of.iter().enumerate() {
            writeln!(w, "#{id}\t{name}").with_path(out_path)?;
        }
        writeln!(w, "#QUERY_NAME\tUSER_BINS").with_path(out_path)?;
    }

    let mut rng = SplitMix64::new(SHUFFLE_SEED);
    for chunk in queries.chunks_mut(CHUNK_SIZE) {
        rng.shuffle(chunk);
        chunk.par_iter().try_for_each(|query| -> Result<()> {
            let hit = search_one(query, shape, window_size, hibf, threshold);
            let csv = hit
                .user_bins
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let mut w = writer.lock().unwrap();
            writeln!(w, "{}\t{}", hit.name, csv).with_path(out_path)?;
            Ok(())
        })?;
    }

    writer.into_inner().unwrap().flush().with_path(out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibf::InterleavedBloomFilter;

    fn small_hibf() -> Hibf {
        let mut hibf = Hibf::new(2, 0.05);
        let ibf = InterleavedBloomFilter::new(2, 1024, 2);
        let root = hibf.push_node(ibf, (0, 0));
        hibf.mark_leaf(root, 0, 0);
        hibf.mark_leaf(root, 1, 1);
        hibf.user_bins.push("ref_a.fasta".into());
        hibf.user_bins.push("ref_b.fasta".into());
        hibf
    }

    #[test]
    fn search_writes_manifest_and_hits() {
        let shape = Shape::ungapped(8);
        let window = 12;
        let mut hibf = small_hibf();
        let reference: &[u8] = b"ACGTACGTTGCATGCATGCAACGTACGTTGCATGCATGCA";
        for hash in query_minimisers(reference, &shape, window) {
            hibf.ibf_vector[0].emplace(hash, 0);
        }

        let threshold = ThresholdEngine::percentage(0.1);
        let queries = vec![Query { name: "q1".into(), sequence: reference.to_vec() }];
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.tsv");

        run_search(queries, &shape, window, &hibf, &threshold, &out_path).unwrap();

        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("#0\tref_a.fasta"));
        assert!(contents.contains("#QUERY_NAME\tUSER_BINS"));
        assert!(contents.contains("q1\t0"));
    }

    #[test]
    fn read_queries_parses_fasta_multiline_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.fasta");
        std::fs::write(&path, ">q1 description\nACGT\nACGT\n>q2\nTTTT\n").unwrap();

        let queries = read_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].name, "q1");
        assert_eq!(queries[0].sequence, b"ACGTACGT");
        assert_eq!(queries[1].name, "q2");
        assert_eq!(queries[1].sequence, b"TTTT");
    }

    #[test]
    fn read_queries_parses_fastq_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.fastq");
        std::fs::write(&path, "@r1 desc\nACGTACGT\n+\nIIIIIIII\n").unwrap();

        let queries = read_queries(&path).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name, "r1");
        assert_eq!(queries[0].sequence, b"ACGTACGT");
    }

    #[test]
    fn read_queries_rejects_unrecognised_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.txt");
        std::fs::write(&path, "not a fasta or fastq file\n").unwrap();
        assert!(read_queries(&path).is_err());
    }

    #[test]
    fn no_hit_produces_empty_user_bin_field() {
        let shape = Shape::ungapped(8);
        let window = 12;
        let hibf = small_hibf();
        let threshold = ThresholdEngine::percentage(0.9);
        let queries = vec![Query { name: "q2".into(), sequence: b"TTTTTTTTTTTTTTTTTTTTTT".to_vec() }];
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.tsv");

        run_search(queries, &shape, window, &hibf, &threshold, &out_path).unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("q2\t"));
    }
}
