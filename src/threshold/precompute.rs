//! Builds the probabilistic threshold table: one entry per observed
//! minimiser count in `[min_count, max_count]`, each the number of matches
//! needed for the cumulative probability of seeing at least that many
//! correct matches under `errors` substitutions to reach `tau`.

use super::logspace;
use super::models::{multiple_error_model, one_error_model, one_indirect_error_model};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use seqkmer::Shape;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub fn precompute_threshold(
    query_length: usize,
    window_size: usize,
    shape: &Shape,
    errors: usize,
    tau: f64,
) -> Vec<usize> {
    let kmer_size = shape.size() as usize;
    let log_tau = tau.ln();
    let kmers_per_window = window_size - kmer_size + 1;
    let kmers_per_pattern = query_length - kmer_size + 1;
    let min_count = kmers_per_pattern / kmers_per_window;
    let max_count = query_length - window_size + 1;

    let indirect = one_indirect_error_model(query_length, window_size, shape);

    let mut thresholds = Vec::with_capacity(max_count.saturating_sub(min_count) + 1);
    for number_of_minimisers in min_count..=max_count {
        let p_mean = (number_of_minimisers as f64).ln() - (kmers_per_pattern as f64).ln();
        let one_error = one_error_model(kmer_size, p_mean, &indirect);
        let e_errors = multiple_error_model(number_of_minimisers, errors, &one_error);

        let max_affected = e_errors
            .iter()
            .position(|&p| p == f64::NEG_INFINITY)
            .unwrap_or(e_errors.len());

        let mut affected = 0usize;
        let mut cumulative = e_errors[0];
        while cumulative < log_tau && affected < max_affected {
            let next = affected + 1;
            if next >= e_errors.len() {
                break;
            }
            affected = next;
            cumulative = logspace::add(cumulative, e_errors[affected]);
        }
        thresholds.push(number_of_minimisers - affected);
    }
    thresholds
}

fn cache_key(query_length: usize, window_size: usize, shape: &Shape, errors: usize, tau_bits: u64) -> String {
    format!(
        "threshold_{:x}_{:x}_{:x}_{:x}_{:x}_{:x}.bin",
        query_length, window_size, shape.mask(), shape.size(), errors, tau_bits
    )
}

fn read_cache(path: &Path) -> std::io::Result<Vec<usize>> {
    let mut reader = BufReader::new(File::open(path)?);
    let len = reader.read_u64::<LittleEndian>()? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(reader.read_u64::<LittleEndian>()? as usize);
    }
    Ok(out)
}

fn write_cache(path: &Path, values: &[usize]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_u64::<LittleEndian>(values.len() as u64)?;
    for &v in values {
        writer.write_u64::<LittleEndian>(v as u64)?;
    }
    Ok(())
}

pub fn load_or_compute(
    cache_dir: Option<&Path>,
    query_length: usize,
    window_size: usize,
    shape: &Shape,
    errors: usize,
    tau: f64,
) -> Vec<usize> {
    let cache_path: Option<PathBuf> = cache_dir.map(|dir| {
        dir.join(cache_key(query_length, window_size, shape, errors, tau.to_bits()))
    });

    if let Some(path) = &cache_path {
        if let Ok(cached) = read_cache(path) {
            return cached;
        }
    }

    let thresholds = precompute_threshold(query_length, window_size, shape, errors, tau);

    if let Some(path) = &cache_path {
        let _ = write_cache(path, &thresholds);
    }
    thresholds
}
