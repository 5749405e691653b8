//! Configuration surface for opening a [`crate::Store`].
//!
//! Nothing here reads environment variables or process arguments; an
//! embedding binary (e.g. an HTTP façade) owns that and constructs
//! [`StoreOptions`] explicitly.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Reference default roll threshold: 10 MiB.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Knobs needed to open a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Store root directory; created if it does not exist.
    pub dir: PathBuf,
    /// Size in bytes at which the active log is rolled into a sealed
    /// segment. Tests exercise values as small as 130 bytes.
    pub max_segment_size: u64,
}

impl StoreOptions {
    /// Start from `dir` with the reference default roll threshold.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }

    /// Override the store root directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Override the roll threshold.
    pub fn with_max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(Error::InvalidConfig("max_segment_size must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn dir_path(&self) -> &Path {
        &self.dir
    }
}

impl Default for StoreOptions {
    /// Defaults to the current directory at the reference 10 MiB threshold.
    /// Callers will almost always override `dir` via [`StoreOptions::new`].
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}
