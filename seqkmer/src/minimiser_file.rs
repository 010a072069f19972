//! On-disk minimiser file (spec C3): a flat little-endian `u64` array, one
//! entry per distinct minimiser hash a `prepare` pass already computed, so a
//! later build step can skip re-reading and re-hashing the original
//! sequence file entirely.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

pub fn write_minimiser_file<P: AsRef<Path>>(path: P, hashes: &[u64]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for &hash in hashes {
        writer.write_u64::<LittleEndian>(hash)?;
    }
    writer.flush()
}

pub fn read_minimiser_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<u64>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hashes = Vec::new();
    loop {
        match reader.read_u64::<LittleEndian>() {
            Ok(value) => hashes.push(value),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(hashes)
}

/// Companion sidecar: the shape/window/cutoff a `.minimiser` file was
/// produced with, plus how many hashes it holds, so a consumer can sanity
/// check it before trusting it. Written as one whitespace-separated text
/// line: `shape_string window_size cutoff kept_count`, where `shape_string`
/// is the shape's bitmask written as a binary digit string of length
/// `shape_size` (matching the original `compute_bin_size` header reader,
/// which reads `shape_string` as a token and parses it base-2).
pub struct MinimiserHeader {
    pub shape_mask: u64,
    pub shape_size: u8,
    pub window_size: u64,
    pub cutoff: u32,
    pub kept_count: u64,
}

pub fn write_header_file<P: AsRef<Path>>(path: P, header: &MinimiserHeader) -> io::Result<()> {
    let shape_string = format!("{:0width$b}", header.shape_mask, width = header.shape_size as usize);
    let mut file = File::create(path)?;
    writeln!(file, "{} {} {} {}", shape_string, header.window_size, header.cutoff, header.kept_count)
}

pub fn read_header_file<P: AsRef<Path>>(path: P) -> io::Result<MinimiserHeader> {
    let contents = std::fs::read_to_string(path)?;
    let mut fields = contents.split_whitespace();
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());

    let shape_string = fields.next().ok_or_else(|| invalid("minimiser header missing shape_string"))?;
    let window_size = fields
        .next()
        .ok_or_else(|| invalid("minimiser header missing window_size"))?
        .parse::<u64>()
        .map_err(|e| invalid(&e.to_string()))?;
    let cutoff = fields
        .next()
        .ok_or_else(|| invalid("minimiser header missing cutoff"))?
        .parse::<u32>()
        .map_err(|e| invalid(&e.to_string()))?;
    let kept_count = fields
        .next()
        .ok_or_else(|| invalid("minimiser header missing kept_count"))?
        .parse::<u64>()
        .map_err(|e| invalid(&e.to_string()))?;

    let shape_mask = u64::from_str_radix(shape_string, 2).map_err(|e| invalid(&e.to_string()))?;
    let shape_size = shape_string.len() as u8;

    Ok(MinimiserHeader { shape_mask, shape_size, window_size, cutoff, kept_count })
}
