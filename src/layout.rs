//! Directory layout: file/segment naming and the scanner used by recovery.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::Result;

/// Name of the active, append-only log within the store root.
pub const ACTIVE_LOG_NAME: &str = "current-data";

/// Prefix shared by every segment-container directory name.
pub const CONTAINER_PREFIX: &str = "container";

/// Suffix appended to `<n>-segment` file names.
pub const SEGMENT_SUFFIX: &str = "-segment";

/// Names of every entry directly under `dir`, in no particular order.
pub fn list(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Find an existing container among `dir`'s entries, or create a fresh one.
///
/// The first entry (in whatever order the filesystem returns) whose name
/// starts with [`CONTAINER_PREFIX`] is chosen; this mirrors the tolerance for
/// a crash having left more than one container behind (see
/// [`remove_other_containers`]).
pub fn select_or_create_container(dir: &Path) -> Result<PathBuf> {
    for name in list(dir)? {
        if name.starts_with(CONTAINER_PREFIX) {
            return Ok(dir.join(name));
        }
    }
    create_container(dir)
}

/// Create a fresh container directory with a random, unique suffix.
pub fn create_container(dir: &Path) -> Result<PathBuf> {
    let suffix: String = rand::rng().sample_iter(&Alphanumeric).take(10).map(char::from).collect();
    let path = dir.join(format!("{CONTAINER_PREFIX}{suffix}"));
    fs::create_dir(&path)?;
    Ok(path)
}

/// Remove every container under `dir` other than `keep`, tolerating crashes
/// that left stale containers behind from an interrupted merge.
pub fn remove_other_containers(dir: &Path, keep: &Path) -> Result<()> {
    for name in list(dir)? {
        if name.starts_with(CONTAINER_PREFIX) {
            let path = dir.join(&name);
            if path != keep {
                fs::remove_dir_all(&path)?;
            }
        }
    }
    Ok(())
}

/// Path of the `n`-th segment within `container`.
pub fn segment_path(container: &Path, n: u64) -> PathBuf {
    container.join(format!("{n}{SEGMENT_SUFFIX}"))
}

/// Remove every entry directly under `dir` other than `active_log` and `container`.
pub fn remove_stray_entries(dir: &Path, active_log: &Path, container: &Path) -> Result<()> {
    for name in list(dir)? {
        let path = dir.join(&name);
        if path != active_log && path != container {
            debug!("removing stray entry {}", path.display());
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}
