//! The FPR-correction table: for each observed minimiser count, how many of
//! the matches counted by the IBF could plausibly be false positives rather
//! than true hits, given the filter's false-positive rate. Added to the
//! probabilistic threshold so spurious matches don't lower the effective
//! bar for a real hit.

use super::pascal_row::pascal_row;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use seqkmer::Shape;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub fn precompute_correction(
    query_length: usize,
    window_size: usize,
    shape: &Shape,
    fpr: f64,
    p_max: f64,
) -> Vec<usize> {
    let kmer_size = shape.size() as usize;
    let log_fpr = fpr.ln();
    let log_inv_fpr = (1.0 - fpr).ln();
    let log_p_max = p_max.ln();
    let kmers_per_window = window_size - kmer_size + 1;
    let kmers_per_pattern = query_length - kmer_size + 1;
    let min_count = kmers_per_pattern / kmers_per_window;
    let max_count = query_length - window_size + 1;

    let mut correction = Vec::with_capacity(max_count.saturating_sub(min_count) + 1);
    for number_of_minimisers in min_count..=max_count {
        let binom_coeff = pascal_row(number_of_minimisers);
        let mut number_of_fp = 1usize;
        while number_of_fp <= number_of_minimisers
            && binom_coeff[number_of_fp]
                + number_of_fp as f64 * log_fpr
                + (number_of_minimisers - number_of_fp) as f64 * log_inv_fpr
                >= log_p_max
        {
            number_of_fp += 1;
        }
        correction.push(number_of_fp - 1);
    }
    correction
}

fn cache_key(query_length: usize, window_size: usize, shape: &Shape, fpr_bits: u64, p_max_bits: u64) -> String {
    format!(
        "correction_{:x}_{:x}_{:x}_{:x}_{:x}_{:x}.bin",
        query_length, window_size, shape.mask(), shape.size(), fpr_bits, p_max_bits
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
    fpr: f64,
    p_max: f64,
) -> Vec<usize> {
    let cache_path: Option<PathBuf> = cache_dir.map(|dir| {
        dir.join(cache_key(query_length, window_size, shape, fpr.to_bits(), p_max.to_bits()))
    });

    if let Some(path) = &cache_path {
        if let Ok(cached) = read_cache(path) {
            return cached;
        }
    }

    let correction = precompute_correction(query_length, window_size, shape, fpr, p_max);

    if let Some(path) = &cache_path {
        let _ = write_cache(path, &correction);
    }
    correction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_grows_with_looser_fpr() {
        let shape = Shape::ungapped(8);
        let tight = precompute_correction(50, 16, &shape, 0.001, 0.01);
        let loose = precompute_correction(50, 16, &shape, 0.2, 0.01);
        assert!(loose.iter().sum::<usize>() >= tight.iter().sum::<usize>());
    }

    #[test]
    fn cache_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let shape = Shape::ungapped(8);
        let a = load_or_compute(Some(dir.path()), 50, 16, &shape, 0.05, 0.01);
        let b = load_or_compute(Some(dir.path()), 50, 16, &shape, 0.05, 0.01);
        assert_eq!(a, b);
    }
}
