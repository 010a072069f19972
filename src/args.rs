//! Command-line argument structs shared by the `raptor` binary's subcommands.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Common {
    /// Number of worker threads (build/search parallelism).
    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Suppress progress output on stderr.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Append CPU-time accounting to this file instead of stderr.
    #[arg(long = "timing-output", value_name = "PATH")]
    pub timing_output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Approximate membership filter for large DNA sequence collections")]
pub struct TopArgs {
    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a flat IBF or HIBF index from a bin-path list or layout file.
    Build(BuildArgs),
    /// Query an index and report user-bin hits per read.
    Search(SearchArgs),
    /// Drive an HIBF build from a precomputed layout description.
    Layout(LayoutArgs),
    /// Convert sequence files to on-disk minimiser files.
    Prepare(PrepareArgs),
    /// Insert or delete user bins in an existing HIBF.
    Update(UpdateArgs),
    /// Migrate an older index archive to the current on-disk version.
    Upgrade(UpgradeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[clap(flatten)]
    pub common: Common,

    /// k-mer size (ungapped shape). Mutually exclusive with `--shape`.
    #[arg(long, conflicts_with = "shape")]
    pub kmer: Option<u8>,

    /// Explicit shape bitmask (gapped shape). Mutually exclusive with `--kmer`.
    #[arg(long)]
    pub shape: Option<u64>,

    /// Window size in bases; must be >= the shape's ungapped length.
    #[arg(long, default_value_t = 23)]
    pub window: usize,

    /// Target false-positive rate for a single Bloom filter.
    #[arg(long, default_value_t = 0.05)]
    pub fpr: f64,

    /// Number of hash functions per filter (1..=5).
    #[arg(long, default_value_t = 2)]
    pub hash: usize,

    /// Number of IBF partitions; must be a power of two.
    #[arg(long, default_value_t = 1)]
    pub parts: usize,

    /// Output index path.
    #[arg(long)]
    pub output: PathBuf,

    /// Bin-path list (flat IBF) or layout file (HIBF).
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[clap(flatten)]
    pub common: Common,

    /// Path to the index archive (without partition suffix).
    #[arg(long)]
    pub index: PathBuf,

    /// Query FASTA/FASTQ file.
    #[arg(long)]
    pub query: PathBuf,

    /// Output hit-list path.
    #[arg(long)]
    pub output: PathBuf,

    /// Number of substitution errors to tolerate.
    #[arg(long, default_value_t = 0)]
    pub error: usize,

    /// Fixed-percentage threshold mode: fraction of minimisers required to hit.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Confidence level for the probabilistic threshold model.
    #[arg(long, default_value_t = 0.9999)]
    pub tau: f64,

    /// Per-query bound on the probability of an extra false-positive hit.
    #[arg(long = "p_max", default_value_t = 0.15)]
    pub p_max: f64,

    /// Expected query length; falls back to the first record's length if unset.
    #[arg(long = "query_length")]
    pub query_length: Option<usize>,

    /// Memoise the threshold vectors to disk next to the index.
    #[arg(long = "cache-thresholds", default_value_t = false)]
    pub cache_thresholds: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    #[clap(flatten)]
    pub common: Common,

    /// Layout description produced by an external partitioning collaborator.
    #[arg(long)]
    pub input: PathBuf,

    /// Target false-positive rate for a single Bloom filter.
    #[arg(long, default_value_t = 0.05)]
    pub fpr: f64,

    /// Number of hash functions per filter (1..=5).
    #[arg(long, default_value_t = 2)]
    pub hash: usize,

    /// Output index path.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    #[clap(flatten)]
    pub common: Common,

    /// k-mer size (ungapped shape).
    #[arg(long, conflicts_with = "shape")]
    pub kmer: Option<u8>,

    /// Explicit shape bitmask.
    #[arg(long)]
    pub shape: Option<u64>,

    /// Window size in bases.
    #[arg(long, default_value_t = 23)]
    pub window: usize,

    /// Fixed cutoff; overrides the file-size-dependent policy when set.
    #[arg(long)]
    pub cutoff: Option<u32>,

    /// Input sequence files.
    #[arg(long, num_args = 1.., required = true)]
    pub input: Vec<PathBuf>,

    /// Directory to write `.minimiser`/`.header` pairs into.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[clap(subcommand)]
    pub op: UpdateOp,
}

#[derive(Subcommand, Debug)]
pub enum UpdateOp {
    Insert(InsertArgs),
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InsertArgs {
    #[clap(flatten)]
    pub common: Common,

    /// Index to mutate in place.
    #[arg(long)]
    pub index: PathBuf,

    /// Display name for the new user bin.
    #[arg(long)]
    pub name: String,

    /// Sequence files making up the new user bin.
    #[arg(long, num_args = 1.., required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    #[clap(flatten)]
    pub common: Common,

    /// Index to mutate in place.
    #[arg(long)]
    pub index: PathBuf,

    /// User-bin IDs to delete.
    #[arg(long, num_args = 1.., required = true)]
    pub user_bins: Vec<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct UpgradeArgs {
    #[clap(flatten)]
    pub common: Common,

    /// Index archive to migrate.
    #[arg(long)]
    pub index: PathBuf,

    /// Destination path; defaults to overwriting `--index`.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Parses sizes like `2G`, `512M`, `100K` into a byte count.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (digits, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    };
    let value: f64 = digits.parse().map_err(|_| format!("invalid size: {s}"))?;
    let multiplier = match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => 1024.0,
        "M" | "MB" => 1024.0 * 1024.0,
        "G" | "GB" => 1024.0 * 1024.0 * 1024.0,
        "T" | "TB" => 1024.0_f64.powi(4),
        other => return Err(format!("unknown size suffix: {other}")),
    };
    Ok((value * multiplier) as usize)
}
