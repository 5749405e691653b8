//! The read path: lock-protected index lookup, positioned read, digest
//! verification. Readers never mutate shared state and only hold the mutex
//! long enough to snapshot it.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use crate::error::Error;
use crate::record;
use crate::shared::Shared;
use crate::Result;

pub(crate) fn get(shared: &Shared, key: &str) -> Result<String> {
    let mut files = shared.lock().index.snapshot();
    files.sort_by(|(a, _), (b, _)| a.cmp(b));

    // Newest first: the active log, then the most recently merged segment.
    for (path, file_index) in files.into_iter().rev() {
        let Some(offset) = file_index.get(key) else {
            continue;
        };

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let (value, digest) = record::read_value_and_digest(&mut file)?;
        if digest != record::digest_of(key, &value) {
            return Err(Error::DigestMismatch { path, offset });
        }
        return Ok(value);
    }

    Err(Error::NotFound)
}
