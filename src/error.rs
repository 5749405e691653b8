use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::Store`] and its supporting components.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is absent from every per-file index.
    #[error("key not found")]
    NotFound,

    /// A record was read successfully but its digest does not match the
    /// key/value bytes.
    #[error("digest mismatch for record at offset={offset} in {path}", path = .path.display())]
    DigestMismatch { path: PathBuf, offset: u64 },

    /// Record framing is inconsistent: a short read, a declared size that
    /// exceeds what was actually on disk, or a truncated digest.
    #[error("corrupt record in {path}: {reason}", path = .path.display())]
    CorruptFile { path: PathBuf, reason: String },

    /// An operation was submitted after [`crate::Store::close`] began draining
    /// the write or merge pipeline.
    #[error("store is closed")]
    Closed,

    /// `StoreOptions` failed validation before a store could be opened.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying file-system error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
