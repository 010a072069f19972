//! CPU-time accounting. Workers accumulate elapsed nanoseconds into shared
//! atomics; the driver prints a human-readable summary (or appends to
//! `--timing-output` when set) once a stage completes.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct Timer {
    nanos: AtomicU64,
}

impl Timer {
    pub fn new() -> Self {
        Self { nanos: AtomicU64::new(0) }
    }

    /// Times `f` and adds its elapsed duration to the accumulator.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.nanos.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        out
    }

    pub fn add(&self, elapsed: std::time::Duration) {
        self.nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn total(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.total().as_secs_f64())
    }
}

/// Aggregate timing for one subcommand's named stages, printed (or appended
/// to a file) in the order stages were registered.
#[derive(Default)]
pub struct StageTimers {
    stages: Vec<(&'static str, Timer)>,
}

impl StageTimers {
    pub fn new(stage_names: &[&'static str]) -> Self {
        Self { stages: stage_names.iter().map(|&n| (n, Timer::new())).collect() }
    }

    pub fn get(&self, name: &str) -> &Timer {
        self.stages
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
            .unwrap_or_else(|| panic!("unknown timing stage: {name}"))
    }

    pub fn report(&self, quiet: bool, output: Option<&Path>) -> std::io::Result<()> {
        let mut lines = String::new();
        for (name, timer) in &self.stages {
            lines.push_str(&format!("{name}: {timer}\n"));
        }
        if let Some(path) = output {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(lines.as_bytes())?;
        } else if !quiet {
            eprint!("{lines}");
        }
        Ok(())
    }
}
