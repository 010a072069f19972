//! `raptor`: build, search, and maintain approximate-membership indexes over
//! large collections of DNA sequences.

use clap::Parser;
use raptor::args::{Command, DeleteArgs, InsertArgs, TopArgs, UpdateOp, UpgradeArgs};
use raptor::args::{BuildArgs, LayoutArgs, PrepareArgs, SearchArgs};
use raptor::error::{RaptorError, Result};
use raptor::hibf::Hibf;
use raptor::search::Query;
use raptor::threshold::ThresholdEngine;
use seqkmer::Shape;
use std::collections::HashSet;
use std::path::PathBuf;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Resolves `--kmer`/`--shape` into a `Shape`, defaulting to an ungapped
/// 20-mer when neither is given.
fn resolve_shape(kmer: Option<u8>, shape_mask: Option<u64>) -> Result<Shape> {
    match (kmer, shape_mask) {
        (Some(k), None) => Ok(Shape::ungapped(k)),
        (None, Some(mask)) => {
            let size = 64 - mask.leading_zeros().min(64);
            Ok(Shape::new(mask, size as u8))
        }
        (None, None) => Ok(Shape::ungapped(20)),
        (Some(_), Some(_)) => Err(RaptorError::Argument("--kmer and --shape are mutually exclusive".into())),
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    let shape = resolve_shape(args.kmer, args.shape)?;
    if shape.size() as usize >= args.window {
        return Err(RaptorError::Invariant(format!(
            "window ({}) must be larger than the shape size ({})",
            args.window,
            shape.size()
        )));
    }
    if !args.parts.is_power_of_two() {
        return Err(RaptorError::Argument("--parts must be a power of two".into()));
    }
    if !(1..=5).contains(&args.hash) {
        return Err(RaptorError::Argument("--hash must be between 1 and 5".into()));
    }

    let timers = raptor::timing::StageTimers::new(&["build"]);
    let params = raptor::build::BuildParams {
        window_size: args.window,
        shape,
        fpr: args.fpr,
        hash_count: args.hash,
        parts: args.parts,
    };
    timers.get("build").time(|| raptor::build::build_flat_index(&args.input, &args.output, &params))?;
    timers.report(args.common.quiet, args.common.timing_output.as_deref()).ok();
    Ok(())
}

fn run_layout(args: LayoutArgs) -> Result<()> {
    let timers = raptor::timing::StageTimers::new(&["layout"]);
    let (hibf, config) =
        timers.get("layout").time(|| raptor::layout::build_from_layout(&args.input))?;
    // The layout file's own fpr/hash_count (baked into every bin's width at
    // build time) are authoritative; `--fpr`/`--hash` are accepted for
    // parity with `build` but only apply when the layout omits them.
    let _ = (args.fpr, args.hash);
    let index_params = raptor::serialize::IndexParams {
        window_size: config.window_size,
        shape: Shape::new(config.shape_mask, config.shape_size),
        partition_count: 1,
        fpr: config.fpr,
    };
    raptor::serialize::write_index(&args.output, std::slice::from_ref(&hibf), &index_params)?;
    timers.report(args.common.quiet, args.common.timing_output.as_deref()).ok();
    Ok(())
}

fn load_index(index_path: &PathBuf) -> Result<(Vec<Hibf>, raptor::serialize::IndexParams)> {
    raptor::serialize::read_index_auto(index_path)
}

fn run_search(args: SearchArgs) -> Result<()> {
    let timers = raptor::timing::StageTimers::new(&["load_index", "load_queries", "search"]);
    let (shards, params) = timers.get("load_index").time(|| load_index(&args.index))?;

    let queries: Vec<Query> = timers.get("load_queries").time(|| raptor::search::read_queries(&args.query))?;
    if queries.is_empty() {
        return Err(RaptorError::Argument(format!("{}: no query records found", args.query.display())));
    }

    let query_length = args.query_length.unwrap_or_else(|| queries[0].sequence.len());
    let kmer_size = params.shape.size() as usize;
    let cache_dir = if args.cache_thresholds {
        args.index.parent().map(|p| p.to_path_buf())
    } else {
        None
    };

    let threshold = if let Some(phi) = args.threshold {
        ThresholdEngine::percentage(phi)
    } else if params.window_size == kmer_size {
        ThresholdEngine::lemma(query_length, args.error, kmer_size)
    } else {
        ThresholdEngine::probabilistic(
            query_length,
            params.window_size,
            &params.shape,
            args.error,
            args.tau,
            params.fpr,
            args.p_max,
            cache_dir.as_deref(),
        )
    };

    if shards.len() == 1 {
        timers.get("search").time(|| {
            raptor::search::run_search(queries, &params.shape, params.window_size, &shards[0], &threshold, &args.output)
        })?;
    } else {
        timers.get("search").time(|| {
            run_search_sharded(queries, &params.shape, params.window_size, &shards, &threshold, &args.output)
        })?;
    }
    timers.report(args.common.quiet, args.common.timing_output.as_deref()).ok();
    Ok(())
}

/// Same manifest/hit-line format as `raptor::search::run_search`, but sums
/// per-bin counts across every partition shard before thresholding (C6).
fn run_search_sharded(
    queries: Vec<Query>,
    shape: &Shape,
    window_size: usize,
    shards: &[Hibf],
    threshold: &ThresholdEngine,
    out_path: &std::path::Path,
) -> Result<()> {
    use raptor::error::IoContext;
    use std::io::Write;

    let file = std::fs::File::create(out_path).with_path(out_path)?;
    let mut w = std::io::BufWriter::new(file);
    for (id, name) in shards[0].user_bins.filename_of.iter().enumerate() {
        writeln!(w, "#{id}\t{name}").with_path(out_path)?;
    }
    writeln!(w, "#QUERY_NAME\tUSER_BINS").with_path(out_path)?;

    let refs: Vec<&Hibf> = shards.iter().collect();
    for query in &queries {
        let hashes = raptor::search::query_minimisers(&query.sequence, shape, window_size);
        let tau = threshold.get(hashes.len()).min(u16::MAX as usize) as u16;
        let hits = Hibf::query_sharded(&refs, &hashes, tau);
        let csv = hits.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        writeln!(w, "{}\t{}", query.name, csv).with_path(out_path)?;
    }
    w.flush().with_path(out_path)?;
    Ok(())
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    use raptor::error::IoContext;

    let shape = resolve_shape(args.kmer, args.shape)?;
    std::fs::create_dir_all(&args.output).with_path(&args.output)?;
    let timers = raptor::timing::StageTimers::new(&["prepare"]);
    timers.get("prepare").time(|| -> Result<()> {
        for input in &args.input {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "input".to_string());
            let output_stem = args.output.join(stem);
            seqkmer::precompute_file(input, &output_stem, &shape, args.window, args.cutoff).with_path(input)?;
        }
        Ok(())
    })?;
    timers.report(args.common.quiet, args.common.timing_output.as_deref()).ok();
    Ok(())
}

fn run_insert(args: InsertArgs) -> Result<()> {
    let (mut shards, params) = load_index(&args.index)?;
    if shards.len() != 1 {
        return Err(RaptorError::Argument("insert is only supported on a non-partitioned index".into()));
    }
    let hashes = raptor::layout::hash_files(&args.files, &params.shape, params.window_size)?;
    raptor::hibf_mutate::insert_user_bin(&mut shards[0], Hibf::ROOT, args.name, &hashes)
        .map_err(|e| RaptorError::Invariant(e.to_string()))?;
    raptor::serialize::write_index(&args.index, &shards, &params)
}

fn run_delete(args: DeleteArgs) -> Result<()> {
    let (mut shards, params) = load_index(&args.index)?;
    let targets: HashSet<u64> = args.user_bins.into_iter().collect();
    for hibf in &mut shards {
        raptor::hibf_mutate::delete_user_bins(hibf, &targets);
    }
    raptor::serialize::write_index(&args.index, &shards, &params)
}

fn run_upgrade(args: UpgradeArgs) -> Result<()> {
    let (shards, params) = raptor::serialize::read_index_for_upgrade(&args.index)?;
    let output = args.output.unwrap_or_else(|| args.index.clone());
    raptor::serialize::write_index(&output, &shards, &params)
}

fn main() {
    let args = TopArgs::parse();
    let result = match args.cmd {
        Command::Build(a) => run_build(a),
        Command::Search(a) => run_search(a),
        Command::Layout(a) => run_layout(a),
        Command::Prepare(a) => run_prepare(a),
        Command::Update(a) => match a.op {
            UpdateOp::Insert(a) => run_insert(a),
            UpdateOp::Delete(a) => run_delete(a),
        },
        Command::Upgrade(a) => run_upgrade(a),
    };
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
