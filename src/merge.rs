//! The merge (compaction) pipeline: a single long-lived consumer loop that,
//! on request, folds every sealed segment into one new segment holding only
//! the latest value per key.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use log::info;

use crate::index::FileIndex;
use crate::layout;
use crate::record::{self, Record};
use crate::shared::{MergeRequest, Shared};
use crate::Result;

/// Runs until `req_rx` disconnects, i.e. until [`crate::Store::close`] drops
/// the merge-request sender.
pub(crate) fn run(dir: PathBuf, active_log_path: PathBuf, shared: Shared, req_rx: Receiver<MergeRequest>) {
    for req in req_rx.iter() {
        let result = merge_once(&dir, &active_log_path, &shared);
        let _ = req.reply.send(result);
    }
}

/// Produce a compacted segment from every sealed segment, skipping the
/// active log, and swap it in as the sole entry of a fresh container.
fn merge_once(dir: &Path, active_log_path: &Path, shared: &Shared) -> Result<()> {
    let (mut sources, old_container) = {
        let state = shared.lock();
        let mut sources = state.index.snapshot();
        sources.sort_by(|(a, _), (b, _)| a.cmp(b));
        (sources, state.container.clone())
    };
    // Newest first, and never read from the log still being appended to.
    sources.reverse();
    sources.retain(|(path, _)| path != active_log_path);
    info!("merge starting: {} sealed segment(s) to fold", sources.len());

    let new_container = layout::create_container(dir)?;
    let new_segment_number = {
        let mut state = shared.lock();
        state.segment_counter = 1;
        state.segment_counter
    };
    let new_segment_path = layout::segment_path(&new_container, new_segment_number);
    let mut new_segment = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&new_segment_path)?;

    let mut compacted = FileIndex::new();
    let mut segment_offset: u64 = 0;
    for (path, file_index) in &sources {
        let mut source = File::open(path)?;
        for (key, &offset) in file_index.iter() {
            if compacted.contains_key(key) {
                continue;
            }
            let (value, digest) = read_at(&mut source, offset, path)?;
            if digest != record::digest_of(key, &value) {
                return Err(crate::Error::DigestMismatch { path: path.clone(), offset });
            }
            let encoded = Record::new(key.clone(), value).encode();
            new_segment.write_all(&encoded)?;
            compacted.insert(key.clone(), segment_offset);
            segment_offset += encoded.len() as u64;
        }
    }
    new_segment.flush()?;

    std::fs::remove_dir_all(&old_container)?;

    let mut state = shared.lock();
    state.container = new_container;
    let keys_to_drop: Vec<PathBuf> = state
        .index
        .sorted_paths()
        .into_iter()
        .filter(|p| p != active_log_path)
        .collect();
    for path in keys_to_drop {
        state.index.remove(&path);
    }
    let keys_compacted = compacted.len();
    state.index.insert(new_segment_path.clone(), compacted);
    info!("merge complete: new segment {} ({keys_compacted} key(s) compacted)", new_segment_path.display());

    Ok(())
}

fn read_at(file: &mut File, offset: u64, path: &Path) -> Result<(String, [u8; record::DIGEST_LEN])> {
    file.seek(SeekFrom::Start(offset))?;
    record::read_value_and_digest(file).map_err(|e| tag_path(e, path, offset))
}

fn tag_path(err: crate::Error, path: &Path, offset: u64) -> crate::Error {
    match err {
        crate::Error::CorruptFile { reason, .. } => crate::Error::CorruptFile {
            path: path.to_path_buf(),
            reason,
        },
        other => {
            let _ = offset;
            other
        }
    }
}
