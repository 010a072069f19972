//! Error types shared across the build, search, and mutation drivers.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RaptorError {
    /// Bad CLI flags or out-of-range parameters, caught before any work starts.
    Argument(String),
    /// Missing files, permission errors, short reads.
    Io { path: PathBuf, source: io::Error },
    /// Malformed layout, truncated index, unsupported version.
    Parse(String),
    /// Temp directory or output directory could not be created.
    Resource(String),
    /// Shape/window/kmer relationships that violate an index-wide invariant.
    Invariant(String),
}

impl fmt::Display for RaptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaptorError::Argument(msg) => write!(f, "[Error] argument: {msg}"),
            RaptorError::Io { path, source } => {
                write!(f, "[Error] io on {}: {source}", path.display())
            }
            RaptorError::Parse(msg) => write!(f, "[Error] parse: {msg}"),
            RaptorError::Resource(msg) => write!(f, "[Error] resource: {msg}"),
            RaptorError::Invariant(msg) => write!(f, "[Error] invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for RaptorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RaptorError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl RaptorError {
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        RaptorError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, RaptorError>;

/// Helper for attaching a path to an `io::Error` via `?`.
pub trait IoContext<T> {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> Result<T> {
        self.map_err(|e| RaptorError::io(path, e))
    }
}
