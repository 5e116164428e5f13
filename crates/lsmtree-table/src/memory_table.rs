//! A trivial in-memory [`TableReader`]/[`TableBuilder`]/[`TableCache`], used only by tests (in
//! this crate and in `lsmtree-core`) in place of a real SST reader/writer. Entries are kept
//! sorted in a `Vec` rather than indexed blocks; fine for test-sized inputs, wrong for
//! production, which is exactly why the real format is out of scope here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{RangeTombstone, TableBuilder, TableBuilderFactory, TableCache, TableError, TableIterator, TableReader};

#[derive(Debug, Clone, Default)]
pub struct MemoryTableReader {
    entries: Arc<Vec<(Vec<u8>, Vec<u8>)>>,
    tombstones: Arc<Vec<RangeTombstone>>,
}

impl MemoryTableReader {
    #[must_use]
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>, tombstones: Vec<RangeTombstone>) -> Self {
        debug_assert!(
            entries.windows(2).all(|w| w[0].0 <= w[1].0),
            "entries must be sorted by internal key",
        );
        Self { entries: Arc::new(entries), tombstones: Arc::new(tombstones) }
    }
}

impl TableReader for MemoryTableReader {
    type Iter<'a> = MemoryTableIter<'a>;

    fn new_iterator(&self) -> Self::Iter<'_> {
        MemoryTableIter { entries: &self.entries, pos: None }
    }

    fn range_tombstones(&self) -> &[RangeTombstone] {
        &self.tombstones
    }

    fn file_size(&self) -> u64 {
        self.entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }
}

#[derive(Debug)]
pub struct MemoryTableIter<'a> {
    entries: &'a [(Vec<u8>, Vec<u8>)],
    /// `None` before the first `seek`/`seek_to_first`, `Some(i)` with `i == entries.len()` once
    /// exhausted.
    pos: Option<usize>,
}

impl TableIterator for MemoryTableIter<'_> {
    fn valid(&self) -> bool {
        matches!(self.pos, Some(i) if i < self.entries.len())
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.expect("valid() checked by caller")].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.expect("valid() checked by caller")].1
    }

    fn seek_to_first(&mut self) {
        self.pos = Some(0);
    }

    fn seek(&mut self, target: &[u8]) {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() < target);
        self.pos = Some(idx);
    }

    fn next(&mut self) {
        let i = self.pos.expect("next() called before a seek");
        self.pos = Some(i + 1);
    }

    fn error(&self) -> Option<crate::TableError> {
        None
    }
}

#[derive(Debug, Default)]
pub struct MemoryTableBuilder {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MemoryTableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the builder, exposing the raw entries so a test can register them with a
    /// [`MemoryTableCache`] as a new file.
    #[must_use]
    pub fn into_entries(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
    }
}

impl TableBuilder for MemoryTableBuilder {
    fn add(&mut self, internal_key: &[u8], value: &[u8]) {
        self.entries.push((internal_key.to_vec(), value.to_vec()));
    }

    fn estimated_size(&self) -> u64 {
        self.entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }

    fn num_entries(&self) -> u64 {
        self.entries.len() as u64
    }

    fn finish(self) -> Result<u64, TableError> {
        Ok(self.entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum())
    }
}

/// An in-memory [`TableCache`] backed by a shared registry of `file_number -> MemoryTableReader`.
/// A test populates it directly with [`MemoryTableCache::insert`] rather than going through a
/// real file-opening path.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableCache {
    tables: Arc<Mutex<HashMap<u64, MemoryTableReader>>>,
    outstanding: Arc<Mutex<HashMap<u64, u32>>>,
}

impl MemoryTableCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_number: u64, reader: MemoryTableReader) {
        self.tables.lock().unwrap().insert(file_number, reader);
    }

    /// Number of `get` calls not yet balanced by `release`, for tests to assert on.
    #[must_use]
    pub fn outstanding(&self, file_number: u64) -> u32 {
        *self.outstanding.lock().unwrap().get(&file_number).unwrap_or(&0)
    }
}

impl TableCache for MemoryTableCache {
    type Reader = MemoryTableReader;

    fn get(&self, file_number: u64, _path: &str) -> Result<Self::Reader, TableError> {
        let reader = self
            .tables
            .lock()
            .unwrap()
            .get(&file_number)
            .cloned()
            .ok_or_else(|| TableError::Io(format!("no such table: {file_number}")))?;
        *self.outstanding.lock().unwrap().entry(file_number).or_insert(0) += 1;
        Ok(reader)
    }

    fn release(&self, file_number: u64) {
        if let Some(count) = self.outstanding.lock().unwrap().get_mut(&file_number) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Hands out fresh [`MemoryTableBuilder`]s and registers their finished contents back into a
/// [`MemoryTableCache`] under the requested file number, so a compaction job's output can be
/// read back within the same test.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableBuilderFactory {
    cache: MemoryTableCache,
}

impl MemoryTableBuilderFactory {
    #[must_use]
    pub fn new(cache: MemoryTableCache) -> Self {
        Self { cache }
    }
}

impl TableBuilderFactory for MemoryTableBuilderFactory {
    type Builder = RegisteringMemoryTableBuilder;

    fn new_builder(&self, file_number: u64, _path: &str) -> Result<Self::Builder, TableError> {
        Ok(RegisteringMemoryTableBuilder {
            cache: self.cache.clone(),
            file_number,
            entries: Vec::new(),
        })
    }
}

/// A [`MemoryTableBuilder`] that, on [`TableBuilder::finish`], inserts its entries into the
/// owning [`MemoryTableCache`] so the file it just wrote can immediately be opened for reading.
#[derive(Debug)]
pub struct RegisteringMemoryTableBuilder {
    cache: MemoryTableCache,
    file_number: u64,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TableBuilder for RegisteringMemoryTableBuilder {
    fn add(&mut self, internal_key: &[u8], value: &[u8]) {
        self.entries.push((internal_key.to_vec(), value.to_vec()));
    }

    fn estimated_size(&self) -> u64 {
        self.entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }

    fn num_entries(&self) -> u64 {
        self.entries.len() as u64
    }

    fn finish(self) -> Result<u64, TableError> {
        let size = self.entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
        self.cache.insert(self.file_number, MemoryTableReader::new(self.entries, Vec::new()));
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterator_seeks_to_lower_bound() {
        let reader = MemoryTableReader::new(
            vec![(b"a".to_vec(), b"1".to_vec()), (b"c".to_vec(), b"2".to_vec())],
            Vec::new(),
        );
        let mut it = reader.new_iterator();
        it.seek(b"b");
        assert!(it.valid());
        assert_eq!(it.key(), b"c");
    }

    #[test]
    fn cache_get_release_balance() {
        let cache = MemoryTableCache::new();
        cache.insert(1, MemoryTableReader::new(Vec::new(), Vec::new()));
        let _r = cache.get(1, "1.sst").unwrap();
        assert_eq!(cache.outstanding(1), 1);
        cache.release(1);
        assert_eq!(cache.outstanding(1), 0);
    }

    #[test]
    fn builder_factory_registers_finished_files_for_reading() {
        let cache = MemoryTableCache::new();
        let factory = MemoryTableBuilderFactory::new(cache.clone());

        let mut builder = factory.new_builder(7, "000007.sst").unwrap();
        builder.add(b"a", b"1");
        builder.add(b"b", b"2");
        builder.finish().unwrap();

        let reader = cache.get(7, "000007.sst").unwrap();
        let mut it = reader.new_iterator();
        it.seek_to_first();
        assert!(it.valid());
        assert_eq!(it.key(), b"a");
    }
}
