//! The public façade: `open`, `put`, `get`, `close`. Owns the shared index,
//! and spawns and orchestrates the write and merge pipelines.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::error::Error;
use crate::index::{FileIndex, GlobalIndex};
use crate::layout;
use crate::merge;
use crate::options::StoreOptions;
use crate::record::Record;
use crate::reader;
use crate::shared::{MergeRequest, Shared, SharedState, WriteRequest};
use crate::write;
use crate::Result;

/// A persistent, single-node, append-only key-value store.
///
/// Created with [`Store::open`]. All writes go through a single serializing
/// pipeline; reads never block writers beyond a brief index-snapshot lock.
pub struct Store {
    dir: PathBuf,
    shared: Shared,
    write_tx: Option<Sender<WriteRequest>>,
    merge_tx: Option<Sender<MergeRequest>>,
    write_handle: Option<JoinHandle<()>>,
    merge_handle: Option<JoinHandle<()>>,
}

impl Store {
    /// Open (creating if necessary) the store rooted at `options.dir`,
    /// replaying every record to rebuild the in-memory index, then start the
    /// write and merge pipelines.
    pub fn open(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let dir = options.dir_path().to_path_buf();
        fs::create_dir_all(&dir)?;

        let active_log_path = dir.join(layout::ACTIVE_LOG_NAME);
        // Must exist before replay touches it: a fresh store directory has no
        // `current-data` yet, and replay only ever reads.
        let active_log_file = OpenOptions::new().create(true).append(true).open(&active_log_path)?;
        let container = layout::select_or_create_container(&dir)?;
        layout::remove_other_containers(&dir, &container)?;

        let mut segment_names = layout::list(&container)?;
        segment_names.sort();
        let segment_counter = segment_names.len() as u64;

        let mut index = GlobalIndex::new();
        let mut records_recovered: usize = 0;
        for name in &segment_names {
            let path = container.join(name);
            let (file_index, _len) = replay(&path)?;
            records_recovered += file_index.len();
            index.insert(path, file_index);
        }
        let (active_index, write_offset) = replay(&active_log_path)?;
        records_recovered += active_index.len();
        index.insert(active_log_path.clone(), active_index);

        let shared: Shared = Arc::new(Mutex::new(SharedState {
            index,
            segment_counter,
            container,
        }));

        let (merge_tx, merge_rx) = crossbeam_channel::unbounded::<MergeRequest>();
        let merge_handle = thread::Builder::new()
            .name("logkv-merge".into())
            .spawn({
                let dir = dir.clone();
                let active_log_path = active_log_path.clone();
                let shared = shared.clone();
                move || merge::run(dir, active_log_path, shared, merge_rx)
            })
            .map_err(io_err)?;

        let (write_tx, write_rx) = crossbeam_channel::unbounded::<WriteRequest>();
        let write_handle = thread::Builder::new()
            .name("logkv-write".into())
            .spawn({
                let dir = dir.clone();
                let active_log_path = active_log_path.clone();
                let shared = shared.clone();
                let merge_tx = merge_tx.clone();
                let max_segment_size = options.max_segment_size;
                move || write::run(dir, active_log_path, active_log_file, write_offset, max_segment_size, shared, write_rx, merge_tx)
            })
            .map_err(io_err)?;

        let store = Store {
            dir,
            shared,
            write_tx: Some(write_tx),
            merge_tx: Some(merge_tx),
            write_handle: Some(write_handle),
            merge_handle: Some(merge_handle),
        };

        if segment_counter > 1 {
            store.request_merge()?;
        }

        info!(
            "opened store at {} ({} sealed segment(s), {} record(s) recovered)",
            store.dir.display(),
            segment_counter,
            records_recovered
        );
        Ok(store)
    }

    /// Append-or-overwrite `key` with `value`, blocking until the record is
    /// durably written (and, if triggered, any resulting merge completes).
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let record = Record::new(key.into(), value.into());
        let tx = self.write_tx.as_ref().ok_or(Error::Closed)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        tx.send(WriteRequest { record, reply: reply_tx }).map_err(|_| Error::Closed)?;
        reply_rx.recv().map_err(|_| Error::Closed)?
    }

    /// Look up `key`'s latest value, verifying its digest.
    pub fn get(&self, key: &str) -> Result<String> {
        reader::get(&self.shared, key)
    }

    /// Stop accepting writes, drain and join both pipelines, and remove any
    /// stray entries under the store directory other than the active log and
    /// the current container.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn request_merge(&self) -> Result<()> {
        let tx = self.merge_tx.as_ref().ok_or(Error::Closed)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        tx.send(MergeRequest { reply: reply_tx }).map_err(|_| Error::Closed)?;
        reply_rx.recv().map_err(|_| Error::Closed)?
    }

    /// Idempotent: safe to call from both [`Store::close`] and [`Drop`].
    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender closes the channel; the loop's `for req in
        // req_rx.iter()` then returns and the thread exits, dropping (and so
        // closing) the active-log handle it alone owns.
        drop(self.write_tx.take());
        if let Some(handle) = self.write_handle.take() {
            let _ = handle.join();
        }

        let active_log_path = self.dir.join(layout::ACTIVE_LOG_NAME);
        let container = self.shared.lock().container.clone();
        let cleanup = layout::remove_stray_entries(&self.dir, &active_log_path, &container);

        drop(self.merge_tx.take());
        if let Some(handle) = self.merge_handle.take() {
            let _ = handle.join();
        }

        cleanup
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::Io(e)
}

/// Replay every record in `path`, rebuilding its [`FileIndex`] and returning
/// the offset one past the last record (the write offset, for the active log).
fn replay(path: &std::path::Path) -> Result<(FileIndex, u64)> {
    let mut file = File::open(path)?;
    let mut index = FileIndex::new();
    let mut offset: u64 = 0;

    loop {
        let mut size_buf = [0u8; 4];
        if !read_or_clean_eof(&mut file, &mut size_buf, path)? {
            warn!("recovery stopped at clean EOF in {}, offset {}", path.display(), offset);
            break;
        }
        let total_size = u32::from_le_bytes(size_buf) as usize;
        if total_size < 4 {
            return Err(corrupt(path, "declared record size smaller than its own header"));
        }
        let mut rest = vec![0u8; total_size - 4];
        std::io::Read::read_exact(&mut file, &mut rest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                corrupt(path, "truncated record")
            } else {
                io_err(e)
            }
        })?;

        let mut buf = Vec::with_capacity(total_size);
        buf.extend_from_slice(&size_buf);
        buf.extend_from_slice(&rest);
        let record = Record::decode(&buf).map_err(|e| retag(e, path))?;
        if !record.verify() {
            return Err(corrupt(path, "digest mismatch during recovery"));
        }

        index.insert(record.key, offset);
        offset += total_size as u64;
    }

    Ok((index, offset))
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` only for a clean
/// EOF at the very start of the read (the normal stop condition).
fn read_or_clean_eof(file: &mut File, buf: &mut [u8], path: &std::path::Path) -> Result<bool> {
    use std::io::Read;
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..])? {
            0 if read == 0 => return Ok(false),
            0 => return Err(corrupt(path, "truncated record header")),
            n => read += n,
        }
    }
    Ok(true)
}

fn corrupt(path: &std::path::Path, reason: &str) -> Error {
    error!("corrupt record in {}: {reason}", path.display());
    Error::CorruptFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn retag(err: Error, path: &std::path::Path) -> Error {
    match err {
        Error::CorruptFile { reason, .. } => corrupt(path, &reason),
        other => other,
    }
}
