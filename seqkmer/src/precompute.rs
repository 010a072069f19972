//! Minimiser precompute (spec C4): hashes an input file once into a
//! `.minimiser`/`.header` pair (C3) so a later build doesn't re-read it.
//! Resumable: work happens under a `.in_progress` suffix and is only
//! renamed into place once the whole file has been hashed, so a crash mid
//! -run never leaves a truncated file masquerading as finished.

use crate::minimiser::MinimiserIter;
use crate::minimiser_file::{write_header_file, write_minimiser_file, MinimiserHeader};
use crate::records::RecordReader;
use crate::shape::Shape;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File-size boundaries (bytes) the default cutoff schedule steps at.
const BOUNDARY_300M: u64 = 300 * 1024 * 1024;
const BOUNDARY_500M: u64 = 500 * 1024 * 1024;
const BOUNDARY_1G: u64 = 1024 * 1024 * 1024;
const BOUNDARY_3G: u64 = 3 * 1024 * 1024 * 1024;

/// Occurrences of one hash are capped while counting; the cutoff schedule
/// tops out at 50, so distinguishing beyond this just wastes memory.
const MAX_TRACKED_COUNT: u32 = 254;

/// The minimiser occurrence cutoff the default (file-size-driven) policy
/// picks when the caller hasn't fixed one explicitly. The cutoffs and their
/// boundaries are Mantis's: small files get a cutoff of 1, huge ones 50.
/// Since the bounds are calibrated against a gzipped FASTQ file, the
/// comparison size is adjusted first: doubled for FASTA input (no quality
/// scores, so roughly half the bytes per base) and divided by three for an
/// uncompressed file (already cheap to re-scan).
pub fn default_cutoff(file_size_bytes: u64, is_fasta: bool, is_compressed: bool) -> u32 {
    let scaled = file_size_bytes as f64 * if is_fasta { 2.0 } else { 1.0 } / if is_compressed { 1.0 } else { 3.0 };
    let scaled = scaled as u64;
    if scaled <= BOUNDARY_300M {
        1
    } else if scaled <= BOUNDARY_500M {
        3
    } else if scaled <= BOUNDARY_1G {
        10
    } else if scaled <= BOUNDARY_3G {
        20
    } else {
        50
    }
}

fn resolve_cutoff(path: &Path, fixed: Option<u32>) -> io::Result<u32> {
    if let Some(c) = fixed {
        return Ok(c);
    }
    let metadata = fs::metadata(path)?;
    let is_compressed = {
        let mut file = fs::File::open(path)?;
        crate::reader::is_gzipped(&mut file)?
    };
    let is_fasta = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains("fasta") || n.contains(".fa") || n.contains(".fna"))
        .unwrap_or(false);
    Ok(default_cutoff(metadata.len(), is_fasta, is_compressed))
}

/// Hashes every record in `input`, counting how often each minimiser hash
/// occurs across the whole file and keeping only those appearing more than
/// `cutoff` times, then writes `output.with_extension("minimiser")` and
/// `.header`. Mirrors the original `compute_minimiser`'s `minimiser_table`:
/// count everything first, filter once at the end.
///
/// Skips the work entirely if the final `.minimiser` file already exists;
/// on success the in-progress file is renamed into place, never left
/// half-written.
pub fn precompute_file(
    input: &Path,
    output_stem: &Path,
    shape: &Shape,
    window_size: usize,
    cutoff: Option<u32>,
) -> io::Result<()> {
    let minimiser_path = output_stem.with_extension("minimiser");
    let header_path = output_stem.with_extension("header");
    if minimiser_path.exists() && header_path.exists() {
        return Ok(());
    }

    let in_progress: PathBuf = {
        let mut p = minimiser_path.clone().into_os_string();
        p.push(".in_progress");
        PathBuf::from(p)
    };
    if in_progress.exists() {
        fs::remove_file(&in_progress)?;
    }

    let cutoff_value = resolve_cutoff(input, cutoff)?;
    let mut counts: HashMap<u64, u32> = HashMap::new();
    if let Some(reader) = RecordReader::open(input)? {
        for record in reader {
            let (_, seq) = record?;
            if seq.len() + 1 <= window_size {
                continue;
            }
            for (_, hash) in MinimiserIter::new(&seq, shape, window_size) {
                let entry = counts.entry(hash).or_insert(0);
                *entry = (*entry + 1).min(MAX_TRACKED_COUNT);
            }
        }
    }

    let mut hashes: Vec<u64> =
        counts.into_iter().filter(|&(_, count)| count > cutoff_value).map(|(hash, _)| hash).collect();
    hashes.sort_unstable();

    write_minimiser_file(&in_progress, &hashes)?;
    fs::rename(&in_progress, &minimiser_path)?;
    write_header_file(
        &header_path,
        &MinimiserHeader {
            shape_mask: shape.mask(),
            shape_size: shape.size(),
            window_size: window_size as u64,
            cutoff: cutoff_value,
            kept_count: hashes.len() as u64,
        },
    )?;
    Ok(())
}
