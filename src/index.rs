//! In-memory indices mapping keys to their latest on-disk offset.
//!
//! Each file's index is wrapped in an [`Arc`] so that [`GlobalIndex::snapshot`]
//! can hand a reader a cheap, stable view of "which files exist and where
//! their keys are" without holding any lock during the subsequent file I/O:
//! a concurrent write only ever clones-and-replaces the `Arc` it is about to
//! mutate ([`Arc::make_mut`]), so a reader holding an older `Arc` keeps
//! observing a consistent, never-torn index for that file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key → byte offset of a record's first byte within a single file.
#[derive(Debug, Default, Clone)]
pub struct FileIndex(HashMap<String, u64>);

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, offset: u64) {
        self.0.insert(key, offset);
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }
}

/// File path → per-file index. Sorting the keys lexicographically yields
/// recency order: sealed-segment paths (which live inside the container
/// subdirectory, hence contain an extra path separator) sort before the
/// active log's path.
#[derive(Debug, Default)]
pub struct GlobalIndex(HashMap<PathBuf, Arc<FileIndex>>);

impl GlobalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or seed) the index for `path` wholesale.
    pub fn insert(&mut self, path: PathBuf, index: FileIndex) {
        self.0.insert(path, Arc::new(index));
    }

    /// Like [`GlobalIndex::insert`], but adopts an existing `Arc` without
    /// cloning its contents. Used when moving a file's index to a new path
    /// (segment roll, merge swap) rather than rebuilding it.
    pub fn insert_arc(&mut self, path: PathBuf, index: Arc<FileIndex>) {
        self.0.insert(path, index);
    }

    pub fn remove(&mut self, path: &Path) -> Option<Arc<FileIndex>> {
        self.0.remove(path)
    }

    /// Mutable access to `path`'s index, cloning it out of its `Arc` first if
    /// a reader snapshot is still holding a reference to it (copy-on-write).
    pub fn entry_mut(&mut self, path: PathBuf) -> &mut FileIndex {
        Arc::make_mut(self.0.entry(path).or_insert_with(|| Arc::new(FileIndex::new())))
    }

    /// A cheap, stable snapshot of every known file's index. Safe to read
    /// from after releasing the lock that guards `self`.
    pub fn snapshot(&self) -> Vec<(PathBuf, Arc<FileIndex>)> {
        self.0.iter().map(|(path, index)| (path.clone(), index.clone())).collect()
    }

    /// Snapshot of every known file path, sorted lexicographically (oldest
    /// first). Iterating in reverse gives recency order for lookups.
    pub fn sorted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.0.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_log_sorts_after_sealed_segments() {
        let mut index = GlobalIndex::new();
        index.insert(PathBuf::from("/db/current-data"), FileIndex::new());
        index.insert(PathBuf::from("/db/container-abc/1-segment"), FileIndex::new());
        let sorted = index.sorted_paths();
        assert_eq!(sorted.last().unwrap(), &PathBuf::from("/db/current-data"));
    }

    #[test]
    fn file_index_tracks_latest_offset_per_key() {
        let mut fi = FileIndex::new();
        fi.insert("k".into(), 0);
        fi.insert("k".into(), 128);
        assert_eq!(fi.get("k"), Some(128));
        assert_eq!(fi.len(), 1);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_mutation() {
        let mut index = GlobalIndex::new();
        let path = PathBuf::from("/db/current-data");
        index.entry_mut(path.clone()).insert("k".into(), 0);
        let snapshot = index.snapshot();
        index.entry_mut(path.clone()).insert("k".into(), 99);

        let (_, snapshot_index) = snapshot.into_iter().find(|(p, _)| *p == path).unwrap();
        assert_eq!(snapshot_index.get("k"), Some(0));
        assert_eq!(index.entry_mut(path).get("k"), Some(99));
    }
}
