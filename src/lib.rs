//! A persistent, single-node, append-only key-value store with background
//! segment compaction and integrity-checked records.
//!
//! ```no_run
//! use logkv::{Store, StoreOptions};
//!
//! let store = Store::open(StoreOptions::new("/tmp/logkv-example"))?;
//! store.put("hello", "world")?;
//! assert_eq!(store.get("hello")?, "world");
//! store.close()?;
//! # Ok::<(), logkv::Error>(())
//! ```
//!
//! Keys and values are opaque UTF-8 strings; there is no support for
//! transactions, range scans, or deletion. See the module docs for the
//! record format, recovery, and the write/merge pipelines.

mod error;
mod index;
mod layout;
mod merge;
mod options;
mod record;
mod reader;
mod shared;
mod store;
mod write;

pub use error::{Error, Result};
pub use options::{StoreOptions, DEFAULT_MAX_SEGMENT_SIZE};
pub use record::Record;
pub use store::Store;
