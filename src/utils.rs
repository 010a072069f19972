//! Small ambient helpers: byte formatting, file discovery, descriptor limits.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively finds files under `path` whose name starts with `prefix` and
/// ends with `suffix`, sorted for deterministic iteration order.
pub fn find_files<P: AsRef<Path>>(path: P, prefix: &str, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix) && name.ends_with(suffix))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort_unstable();
    files
}

/// Formats a byte count with the appropriate binary-prefix suffix.
pub fn format_bytes(size: f64) -> String {
    let suffixes = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut size = size;
    let mut current_suffix = &suffixes[0];
    for suffix in &suffixes[1..] {
        if size >= 1024.0 {
            current_suffix = suffix;
            size /= 1024.0;
        } else {
            break;
        }
    }
    format!("{:.2}{}", size, current_suffix)
}

/// Builds the partitioned index paths `<base>_0`, `<base>_1`, ... for C6/C11.
pub fn partitioned_paths(base: &Path, parts: usize) -> Vec<PathBuf> {
    (0..parts)
        .map(|i| {
            let mut name = base.file_name().unwrap_or_default().to_os_string();
            name.push(format!("_{i}"));
            base.with_file_name(name)
        })
        .collect()
}

#[cfg(unix)]
pub fn get_file_limit() -> usize {
    let mut limits = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let result = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limits) };
    if result == 0 {
        limits.rlim_cur as usize
    } else {
        0
    }
}

#[cfg(unix)]
pub fn set_fd_limit(new_limit: u64) -> io::Result<()> {
    let rlim = libc::rlimit { rlim_cur: new_limit, rlim_max: new_limit };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rlim) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
pub fn get_file_limit() -> usize {
    8192
}

#[cfg(windows)]
pub fn set_fd_limit(_new_limit: u64) -> io::Result<()> {
    Ok(())
}
