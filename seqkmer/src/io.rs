//! File reader façade (spec C3): produces a lazy stream of 64-bit hashes
//! from either raw sequence files (C1 shape hashing -> C2 minimiser window)
//! or a precomputed `.minimiser` file, behind one capability set. Grounded
//! on the original `file_reader<file_types>` template, which specializes
//! the same `hash_into`/`hash_into_if`/`for_each_hash` surface over a
//! `file_types::sequence` and a `file_types::minimiser` variant; here the
//! two variants are plain structs rather than template specializations, and
//! the choice between them is made once per file by the caller, not by a
//! runtime-dispatched trait object.

use crate::minimiser::MinimiserIter;
use crate::minimiser_file::read_minimiser_file;
use crate::records::RecordReader;
use crate::shape::Shape;
use std::io;
use std::path::{Path, PathBuf};

pub trait HashSource {
    /// Streams every hash `path` yields, in file order, to `f`.
    fn for_each_hash<F: FnMut(u64)>(&self, path: &Path, f: F) -> io::Result<()>;

    /// Like `for_each_hash`, but only hashes `predicate` accepts reach `f`.
    /// Used by the IBF partitioner (C6): each partition re-reads the file
    /// with a different hash-prefix predicate instead of filtering an
    /// already-collected `Vec` in memory.
    fn for_each_hash_if<F: FnMut(u64)>(&self, path: &Path, predicate: impl Fn(u64) -> bool, mut f: F) -> io::Result<()> {
        self.for_each_hash(path, |h| {
            if predicate(h) {
                f(h);
            }
        })
    }

    fn hash_into(&self, files: &[PathBuf], sink: &mut Vec<u64>) -> io::Result<()> {
        for path in files {
            self.for_each_hash(path, |h| sink.push(h))?;
        }
        Ok(())
    }

    fn hash_into_if(&self, files: &[PathBuf], sink: &mut Vec<u64>, predicate: impl Fn(u64) -> bool) -> io::Result<()> {
        for path in files {
            self.for_each_hash_if(path, &predicate, |h| sink.push(h))?;
        }
        Ok(())
    }
}

/// Hashes raw sequence records through C1 (shape hashing) and C2 (minimiser
/// windowing).
pub struct SequenceSource<'a> {
    shape: &'a Shape,
    window_size: usize,
}

impl<'a> SequenceSource<'a> {
    pub fn new(shape: &'a Shape, window_size: usize) -> Self {
        Self { shape, window_size }
    }
}

impl<'a> HashSource for SequenceSource<'a> {
    fn for_each_hash<F: FnMut(u64)>(&self, path: &Path, mut f: F) -> io::Result<()> {
        let Some(reader) = RecordReader::open(path)? else {
            return Ok(());
        };
        for record in reader {
            let (_, seq) = record?;
            for (_, hash) in MinimiserIter::new(&seq, self.shape, self.window_size) {
                f(hash);
            }
        }
        Ok(())
    }
}

/// Reads an already-hashed `.minimiser` file back verbatim (spec C4
/// precompute output); no shape/window parameters are needed to replay it.
pub struct MinimiserFileSource;

impl HashSource for MinimiserFileSource {
    fn for_each_hash<F: FnMut(u64)>(&self, path: &Path, mut f: F) -> io::Result<()> {
        for hash in read_minimiser_file(path)? {
            f(hash);
        }
        Ok(())
    }
}

fn is_minimiser_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("minimiser")
}

/// Dispatches a single file to the matching `HashSource` variant by
/// extension: a `.minimiser` file is read back directly, anything else is
/// scanned as raw sequence.
pub fn hash_into_auto(path: &Path, shape: &Shape, window_size: usize, sink: &mut Vec<u64>) -> io::Result<()> {
    if is_minimiser_file(path) {
        MinimiserFileSource.for_each_hash(path, |h| sink.push(h))
    } else {
        SequenceSource::new(shape, window_size).for_each_hash(path, |h| sink.push(h))
    }
}

pub fn hash_into_auto_if(
    path: &Path,
    shape: &Shape,
    window_size: usize,
    predicate: impl Fn(u64) -> bool,
    sink: &mut Vec<u64>,
) -> io::Result<()> {
    for_each_hash_auto_if(path, shape, window_size, predicate, |h| sink.push(h))
}

/// Callback form of `hash_into_auto_if`: streams matching hashes straight to
/// `f` without collecting them, so a caller that just wants to `emplace`
/// each one into a filter never materializes an intermediate `Vec`.
pub fn for_each_hash_auto_if<F: FnMut(u64)>(
    path: &Path,
    shape: &Shape,
    window_size: usize,
    predicate: impl Fn(u64) -> bool,
    f: F,
) -> io::Result<()> {
    if is_minimiser_file(path) {
        MinimiserFileSource.for_each_hash_if(path, predicate, f)
    } else {
        SequenceSource::new(shape, window_size).for_each_hash_if(path, predicate, f)
    }
}

/// Hashes every file in `files` (dispatching `.minimiser` vs. raw sequence
/// per file) into `sink`.
pub fn hash_files_into(files: &[PathBuf], shape: &Shape, window_size: usize, sink: &mut Vec<u64>) -> io::Result<()> {
    for path in files {
        hash_into_auto(path, shape, window_size, sink)?;
    }
    Ok(())
}

/// Predicate-filtered variant of `hash_files_into`, used to route a bin's
/// files into one IBF partition (C6) without first collecting every hash.
pub fn hash_files_into_if(
    files: &[PathBuf],
    shape: &Shape,
    window_size: usize,
    predicate: impl Fn(u64) -> bool,
    sink: &mut Vec<u64>,
) -> io::Result<()> {
    for path in files {
        hash_into_auto_if(path, shape, window_size, &predicate, sink)?;
    }
    Ok(())
}
