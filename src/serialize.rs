//! Versioned binary index format (spec C11): a header of build-time
//! parameters a search must agree with, followed by the HIBF's flat tree
//! vectors and each node's raw IBF bit/occupancy snapshot. A partitioned
//! build writes one file per partition via `partitioned_paths`, each file
//! independently self-describing (same header shape, carrying its own
//! partition index and count).

use crate::error::{IoContext, RaptorError, Result};
use crate::hibf::{Hibf, UserBins};
use crate::ibf::InterleavedBloomFilter;
use crate::utils::partitioned_paths;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use seqkmer::Shape;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Bumped whenever the on-disk layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;
const MAGIC: u32 = 0x5241_5054; // "RAPT"

pub struct IndexParams {
    pub window_size: usize,
    pub shape: Shape,
    pub partition_count: usize,
    pub fpr: f64,
}

fn write_string(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(s.len() as u64)?;
    w.write_all(s.as_bytes())
}

fn read_string(r: &mut impl Read) -> std::io::Result<String> {
    let len = r.read_u64::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_ibf(w: &mut impl Write, ibf: &InterleavedBloomFilter) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(ibf.bin_count() as u64)?;
    w.write_u64::<LittleEndian>(ibf.bin_width() as u64)?;
    w.write_u64::<LittleEndian>(ibf.hash_count() as u64)?;
    let bits = ibf.bits_snapshot();
    w.write_u64::<LittleEndian>(bits.len() as u64)?;
    for word in &bits {
        w.write_u64::<LittleEndian>(*word)?;
    }
    let occ = ibf.occupancy_snapshot();
    w.write_u64::<LittleEndian>(occ.len() as u64)?;
    for count in &occ {
        w.write_u32::<LittleEndian>(*count)?;
    }
    Ok(())
}

fn read_ibf(r: &mut impl Read) -> std::io::Result<InterleavedBloomFilter> {
    let bin_count = r.read_u64::<LittleEndian>()? as usize;
    let bin_width = r.read_u64::<LittleEndian>()? as usize;
    let hash_count = r.read_u64::<LittleEndian>()? as usize;
    let bits_len = r.read_u64::<LittleEndian>()? as usize;
    let mut bits = Vec::with_capacity(bits_len);
    for _ in 0..bits_len {
        bits.push(r.read_u64::<LittleEndian>()?);
    }
    let occ_len = r.read_u64::<LittleEndian>()? as usize;
    let mut occ = Vec::with_capacity(occ_len);
    for _ in 0..occ_len {
        occ.push(r.read_u32::<LittleEndian>()?);
    }
    Ok(InterleavedBloomFilter::from_parts(bin_count, bin_width, hash_count, bits, occ))
}

/// Writes one partition's worth of the HIBF to `w`. `partition_index` and
/// `partition_count` are 0 and 1 for a non-partitioned build.
fn write_one(
    w: &mut impl Write,
    hibf: &Hibf,
    params: &IndexParams,
    partition_index: usize,
) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u64::<LittleEndian>(params.window_size as u64)?;
    w.write_u64::<LittleEndian>(params.shape.mask())?;
    w.write_u8(params.shape.size())?;
    w.write_u64::<LittleEndian>(hibf.hash_count as u64)?;
    w.write_f64::<LittleEndian>(params.fpr)?;
    w.write_u64::<LittleEndian>(params.partition_count as u64)?;
    w.write_u64::<LittleEndian>(partition_index as u64)?;

    w.write_u64::<LittleEndian>(hibf.user_bins.filename_of.len() as u64)?;
    for name in &hibf.user_bins.filename_of {
        write_string(w, name)?;
    }

    w.write_u64::<LittleEndian>(hibf.ibf_vector.len() as u64)?;
    for node in 0..hibf.ibf_vector.len() {
        let (parent_node, parent_bin) = hibf.prev_ibf_id[node];
        w.write_u64::<LittleEndian>(parent_node as u64)?;
        w.write_u64::<LittleEndian>(parent_bin as u64)?;

        let bin_count = hibf.ibf_vector[node].bin_count();
        w.write_u64::<LittleEndian>(bin_count as u64)?;
        for bin in 0..bin_count {
            w.write_u64::<LittleEndian>(hibf.next_ibf_id[node][bin] as u64)?;
            w.write_u64::<LittleEndian>(hibf.ibf_bin_to_user_bin_id[node][bin])?;
        }
        write_ibf(w, &hibf.ibf_vector[node])?;
    }
    Ok(())
}

/// Reads the user-bin table and node tree shared by every archive
/// generation (versioned or legacy) into a freshly constructed `Hibf`.
fn read_tree(r: &mut impl Read, hibf: &mut Hibf) -> std::io::Result<()> {
    let ub_count = r.read_u64::<LittleEndian>()? as usize;
    for _ in 0..ub_count {
        let name = read_string(r)?;
        hibf.user_bins.push(name);
    }

    let node_count = r.read_u64::<LittleEndian>()? as usize;
    let mut parents = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let parent_node = r.read_u64::<LittleEndian>()? as usize;
        let parent_bin = r.read_u64::<LittleEndian>()? as usize;
        parents.push((parent_node, parent_bin));

        let bin_count = r.read_u64::<LittleEndian>()? as usize;
        let mut next_ids = Vec::with_capacity(bin_count);
        let mut ub_ids = Vec::with_capacity(bin_count);
        for _ in 0..bin_count {
            next_ids.push(r.read_u64::<LittleEndian>()? as usize);
            ub_ids.push(r.read_u64::<LittleEndian>()?);
        }
        let ibf = read_ibf(r)?;
        let idx = hibf.push_node(ibf, parents[parents.len() - 1]);
        hibf.next_ibf_id[idx] = next_ids;
        hibf.ibf_bin_to_user_bin_id[idx] = ub_ids;
    }
    Ok(())
}

fn read_one(r: &mut impl Read) -> std::io::Result<(Hibf, IndexParams, usize)> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != MAGIC {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad magic number"));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported index format version {version}"),
        ));
    }
    let window_size = r.read_u64::<LittleEndian>()? as usize;
    let mask = r.read_u64::<LittleEndian>()?;
    let size = r.read_u8()?;
    let hash_count = r.read_u64::<LittleEndian>()? as usize;
    let fpr = r.read_f64::<LittleEndian>()?;
    let partition_count = r.read_u64::<LittleEndian>()? as usize;
    let partition_index = r.read_u64::<LittleEndian>()? as usize;

    let mut hibf = Hibf::new(hash_count, fpr);
    read_tree(r, &mut hibf)?;

    let params = IndexParams { window_size, shape: Shape::new(mask, size), partition_count, fpr };
    Ok((hibf, params, partition_index))
}

/// Reads a pre-2.0-style archive: the same header fields `write_one` writes,
/// minus the `MAGIC`/`FORMAT_VERSION` envelope and the partitioning fields
/// (the legacy format predates both the version tag and partitioned
/// builds, so every legacy archive is implicitly a single, unpartitioned
/// shard).
fn read_legacy_one(r: &mut impl Read) -> std::io::Result<(Hibf, IndexParams)> {
    let window_size = r.read_u64::<LittleEndian>()? as usize;
    let mask = r.read_u64::<LittleEndian>()?;
    let size = r.read_u8()?;
    let hash_count = r.read_u64::<LittleEndian>()? as usize;
    let fpr = r.read_f64::<LittleEndian>()?;

    let mut hibf = Hibf::new(hash_count, fpr);
    read_tree(r, &mut hibf)?;

    let params = IndexParams { window_size, shape: Shape::new(mask, size), partition_count: 1, fpr };
    Ok((hibf, params))
}

/// Writes `hibf` to `path`, or to `partitioned_paths(path, parts.len())` when
/// more than one partition-shard HIBF is given.
pub fn write_index(path: &Path, hibfs: &[Hibf], params: &IndexParams) -> Result<()> {
    if hibfs.len() == 1 {
        let file = File::create(path).with_path(path)?;
        let mut w = BufWriter::new(file);
        write_one(&mut w, &hibfs[0], params, 0).with_path(path)?;
        return Ok(());
    }
    let paths = partitioned_paths(path, hibfs.len());
    for (i, (shard_path, hibf)) in paths.iter().zip(hibfs.iter()).enumerate() {
        let file = File::create(shard_path).with_path(shard_path)?;
        let mut w = BufWriter::new(file);
        write_one(&mut w, hibf, params, i).with_path(shard_path)?;
    }
    Ok(())
}

/// Reads a single (non-partitioned) index file.
pub fn read_index(path: &Path) -> Result<(Hibf, IndexParams)> {
    let file = File::open(path).with_path(path)?;
    let mut r = BufReader::new(file);
    let (hibf, params, _) = read_one(&mut r).with_path(path)?;
    Ok((hibf, params))
}

/// Reads every shard of a partitioned index, validating they agree on
/// partition count and declare consistent, contiguous indices.
pub fn read_partitioned_index(path: &Path, parts: usize) -> Result<Vec<Hibf>> {
    let paths = partitioned_paths(path, parts);
    let mut shards = Vec::with_capacity(parts);
    for (expected_index, shard_path) in paths.iter().enumerate() {
        let file = File::open(shard_path).with_path(shard_path)?;
        let mut r = BufReader::new(file);
        let (hibf, found_params, partition_index) = read_one(&mut r).with_path(shard_path)?;
        if found_params.partition_count != parts || partition_index != expected_index {
            return Err(RaptorError::Parse(format!(
                "partition shard {} declares index {} of {} (expected {} of {})",
                shard_path.display(),
                partition_index,
                found_params.partition_count,
                expected_index,
                parts
            )));
        }
        shards.push(hibf);
    }
    Ok(shards)
}

pub fn user_bin_names(user_bins: &UserBins) -> &[String] {
    &user_bins.filename_of
}

/// Reads a pre-2.0-style (unversioned, unpartitioned) archive directly.
pub fn read_legacy_index(path: &Path) -> Result<(Hibf, IndexParams)> {
    let file = File::open(path).with_path(path)?;
    let mut r = BufReader::new(file);
    read_legacy_one(&mut r).with_path(path)
}

/// Opens an index for migration (`raptor upgrade`): tries the current
/// versioned layout first via `read_index_auto`, and only on failure falls
/// back to the legacy, unversioned single-shard layout. A file that is
/// neither (bad magic in a way `read_legacy_one` also can't parse, or a
/// byte stream too short for either) surfaces the legacy attempt's error,
/// since that's the branch actually exercised by an old index.
pub fn read_index_for_upgrade(path: &Path) -> Result<(Vec<Hibf>, IndexParams)> {
    match read_index_auto(path) {
        Ok(result) => Ok(result),
        Err(_) => {
            let (hibf, params) = read_legacy_index(path)?;
            Ok((vec![hibf], params))
        }
    }
}

/// Opens an index written by `write_index` without the caller having to know
/// in advance whether it was partitioned: tries `path` directly first (the
/// non-partitioned layout), then falls back to the shard at
/// `partitioned_paths(path, 1)[0]` (whose filename doesn't depend on the
/// total shard count) to learn the true partition count from its own header.
pub fn read_index_auto(path: &Path) -> Result<(Vec<Hibf>, IndexParams)> {
    if let Ok((hibf, params)) = read_index(path) {
        return Ok((vec![hibf], params));
    }
    let shard0_path = &partitioned_paths(path, 1)[0];
    let file = File::open(shard0_path).with_path(path)?;
    let mut r = BufReader::new(file);
    let (_, probe_params, _) = read_one(&mut r).with_path(shard0_path)?;
    let shards = read_partitioned_index(path, probe_params.partition_count)?;
    Ok((shards, probe_params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibf::InterleavedBloomFilter;

    /// Writes the pre-2.0 layout directly (no `MAGIC`/`FORMAT_VERSION`, no
    /// partition fields), simulating an index on disk from before the
    /// versioned envelope existed.
    fn write_legacy_one(w: &mut impl Write, hibf: &Hibf, params: &IndexParams) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(params.window_size as u64)?;
        w.write_u64::<LittleEndian>(params.shape.mask())?;
        w.write_u8(params.shape.size())?;
        w.write_u64::<LittleEndian>(hibf.hash_count as u64)?;
        w.write_f64::<LittleEndian>(params.fpr)?;

        w.write_u64::<LittleEndian>(hibf.user_bins.filename_of.len() as u64)?;
        for name in &hibf.user_bins.filename_of {
            write_string(w, name)?;
        }

        w.write_u64::<LittleEndian>(hibf.ibf_vector.len() as u64)?;
        for node in 0..hibf.ibf_vector.len() {
            let (parent_node, parent_bin) = hibf.prev_ibf_id[node];
            w.write_u64::<LittleEndian>(parent_node as u64)?;
            w.write_u64::<LittleEndian>(parent_bin as u64)?;

            let bin_count = hibf.ibf_vector[node].bin_count();
            w.write_u64::<LittleEndian>(bin_count as u64)?;
            for bin in 0..bin_count {
                w.write_u64::<LittleEndian>(hibf.next_ibf_id[node][bin] as u64)?;
                w.write_u64::<LittleEndian>(hibf.ibf_bin_to_user_bin_id[node][bin])?;
            }
            write_ibf(w, &hibf.ibf_vector[node])?;
        }
        Ok(())
    }

    fn sample_hibf() -> Hibf {
        let mut hibf = Hibf::new(2, 0.05);
        let ibf = InterleavedBloomFilter::new(4, 256, 2);
        ibf.emplace(777, 2);
        let root = hibf.push_node(ibf, (0, 0));
        for b in 0..4 {
            hibf.mark_leaf(root, b, b as u64);
        }
        hibf.user_bins.push("a.fasta".into());
        hibf.user_bins.push("b.fasta".into());
        hibf.user_bins.push("c.fasta".into());
        hibf.user_bins.push("d.fasta".into());
        hibf
    }

    #[test]
    fn round_trips_single_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.raptor");
        let hibf = sample_hibf();
        let params = IndexParams { window_size: 23, shape: Shape::ungapped(19), partition_count: 1, fpr: 0.05 };

        write_index(&path, std::slice::from_ref(&hibf), &params).unwrap();
        let (loaded, loaded_params) = read_index(&path).unwrap();

        assert_eq!(loaded.user_bins.filename_of, hibf.user_bins.filename_of);
        assert_eq!(loaded_params.window_size, 23);
        assert_eq!(loaded.query(&[777], 1), hibf.query(&[777], 1));
    }

    #[test]
    fn round_trips_partitioned_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.raptor");
        let hibfs = vec![sample_hibf(), sample_hibf()];
        let params = IndexParams { window_size: 23, shape: Shape::ungapped(19), partition_count: 2, fpr: 0.05 };

        write_index(&path, &hibfs, &params).unwrap();
        let loaded = read_partitioned_index(&path, 2).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].query(&[777], 1), hibfs[0].query(&[777], 1));
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.raptor");
        std::fs::write(&path, b"not an index").unwrap();
        assert!(read_index(&path).is_err());
    }

    #[test]
    fn upgrade_reads_legacy_archive_and_rewrites_it_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.raptor");
        let hibf = sample_hibf();
        let params = IndexParams { window_size: 23, shape: Shape::ungapped(19), partition_count: 1, fpr: 0.05 };

        let file = File::create(&path).unwrap();
        let mut w = BufWriter::new(file);
        write_legacy_one(&mut w, &hibf, &params).unwrap();
        w.flush().unwrap();

        // A current-format reader must reject this: it's missing the
        // MAGIC/FORMAT_VERSION envelope entirely.
        assert!(read_index(&path).is_err());

        let (shards, migrated_params) = read_index_for_upgrade(&path).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(migrated_params.partition_count, 1);
        assert_eq!(migrated_params.window_size, 23);
        assert_eq!(shards[0].user_bins.filename_of, hibf.user_bins.filename_of);
        assert_eq!(shards[0].query(&[777], 1), hibf.query(&[777], 1));

        let upgraded_path = dir.path().join("new.raptor");
        write_index(&upgraded_path, &shards, &migrated_params).unwrap();
        let (reloaded, reloaded_params) = read_index(&upgraded_path).unwrap();
        assert_eq!(reloaded_params.partition_count, 1);
        assert_eq!(reloaded.query(&[777], 1), hibf.query(&[777], 1));
    }
}
