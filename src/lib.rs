//! Raptor: an approximate membership filter for very large collections of
//! nucleotide sequences, built on interleaved Bloom filters arranged in a
//! hierarchy (HIBF) so a negative at an interior node prunes an entire
//! subtree without a single false negative.

pub mod args;
pub mod build;
pub mod error;
pub mod estimate;
pub mod hibf;
pub mod hibf_mutate;
pub mod ibf;
pub mod layout;
pub mod partition;
pub mod rng;
pub mod search;
pub mod serialize;
pub mod threshold;
pub mod timing;
pub mod utils;

pub use error::{RaptorError, Result};
