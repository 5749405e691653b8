//! The write pipeline: a single long-lived consumer loop that owns the
//! active-log file handle and serializes every append.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::index::FileIndex;
use crate::layout;
use crate::record::Record;
use crate::shared::{MergeRequest, Shared, WriteRequest};
use crate::{Error, Result};

/// Runs until `req_rx` disconnects, i.e. until [`crate::Store::close`] drops
/// the write-request sender. Only this loop ever touches the active-log file
/// handle or its write offset.
pub(crate) fn run(
    dir: PathBuf,
    active_log_path: PathBuf,
    file: File,
    write_offset: u64,
    max_segment_size: u64,
    shared: Shared,
    req_rx: Receiver<WriteRequest>,
    merge_tx: Sender<MergeRequest>,
) {
    let mut file = Some(file);
    let mut write_offset = write_offset;
    for req in req_rx.iter() {
        let result = handle(
            &dir,
            &active_log_path,
            &mut file,
            &mut write_offset,
            max_segment_size,
            &shared,
            &merge_tx,
            req.record,
        );
        // The caller may have stopped waiting; a disconnected reply channel
        // is not this loop's problem, it must keep serving other requests.
        let _ = req.reply.send(result);
    }
}

#[allow(clippy::too_many_arguments)]
fn handle(
    dir: &Path,
    active_log_path: &Path,
    file: &mut Option<File>,
    write_offset: &mut u64,
    max_segment_size: u64,
    shared: &Shared,
    merge_tx: &Sender<MergeRequest>,
    record: Record,
) -> Result<()> {
    let encoded = record.encode();
    let current_size = active_file(file)?.metadata()?.len();
    if current_size + encoded.len() as u64 >= max_segment_size {
        roll(dir, active_log_path, file, write_offset, shared)?;
    }

    let should_merge = shared.lock().segment_counter > 1;
    if should_merge {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        // Errors here mean the merge loop has already shut down; a store
        // that is closing will not accept new puts for long anyway.
        let _ = merge_tx.send(MergeRequest { reply: reply_tx });
        let append_result = append(file, write_offset, shared, active_log_path, &record.key, &encoded);
        let _ = reply_rx.recv();
        append_result
    } else {
        append(file, write_offset, shared, active_log_path, &record.key, &encoded)
    }
}

/// Errors rather than panics if no handle is present: a roll that fails on
/// both its forward and rollback attempts leaves `file` empty, and the loop
/// must keep serving (and erroring out) subsequent requests instead of dying.
fn active_file(file: &mut Option<File>) -> Result<&mut File> {
    file.as_mut().ok_or(Error::Closed)
}

fn append(
    file: &mut Option<File>,
    write_offset: &mut u64,
    shared: &Shared,
    active_log_path: &Path,
    key: &str,
    encoded: &[u8],
) -> Result<()> {
    active_file(file)?.write_all(encoded)?;
    let mut state = shared.lock();
    state
        .index
        .entry_mut(active_log_path.to_path_buf())
        .insert(key.to_string(), *write_offset);
    *write_offset += encoded.len() as u64;
    Ok(())
}

/// Seal the current active log as a new segment and start a fresh one.
fn roll(
    dir: &Path,
    active_log_path: &Path,
    file: &mut Option<File>,
    write_offset: &mut u64,
    shared: &Shared,
) -> Result<()> {
    let _ = dir;
    let new_path = {
        let mut state = shared.lock();
        state.segment_counter += 1;
        layout::segment_path(&state.container, state.segment_counter)
    };

    // Drop the handle before renaming: writes must stop landing in a file
    // that no longer has this name. If either step below fails, roll back
    // and reopen `active_log_path` before returning, so a transient I/O
    // error never leaves the loop without a handle to serve the next
    // request through.
    drop(file.take());
    let rolled = fs::rename(active_log_path, &new_path)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(active_log_path));
    let new_file = match rolled {
        Ok(new_file) => new_file,
        Err(e) => {
            shared.lock().segment_counter -= 1;
            let _ = fs::rename(&new_path, active_log_path);
            *file = OpenOptions::new().create(true).append(true).open(active_log_path).ok();
            return Err(e.into());
        }
    };
    *file = Some(new_file);
    *write_offset = 0;

    let mut state = shared.lock();
    if let Some(moved) = state.index.remove(active_log_path) {
        state.index.insert_arc(new_path.clone(), moved);
    }
    state.index.insert(active_log_path.to_path_buf(), FileIndex::new());
    debug!("rolled {} into segment {}", active_log_path.display(), new_path.display());
    Ok(())
}
