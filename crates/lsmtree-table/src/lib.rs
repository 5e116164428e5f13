//! The table-reading surface that `lsmtree-core` requires from its host, per the "Table surface
//! required from host" section of the core's specification: a cache that hands out table
//! readers by file number, a reader that can be iterated in internal-key order and that exposes
//! its range tombstones, and a builder that a compaction job writes output files through.
//!
//! None of this crate concerns itself with an actual on-disk SST format (block layout, filters,
//! compression, the block cache) — that is explicitly out of scope per spec.md §1. What's here
//! is the trait boundary, plus a minimal in-memory implementation ([`memtable_backed`]) so that
//! `lsmtree-core`'s compaction-job tests have something real to drive.

mod memory_table;
mod tombstones;

use std::fmt::Debug;

pub use memory_table::{MemoryTableBuilder, MemoryTableBuilderFactory, MemoryTableCache, MemoryTableReader};
pub use tombstones::{RangeTombstone, TombstoneAggregator};

/// An entry-level cursor over `(internal_key, value)` pairs in ascending internal-key order.
///
/// Mirrors the classic LevelDB/RocksDB iterator contract, as named explicitly by the core
/// specification's design notes: `valid`, `key`, `value`, `seek_to_first`, `seek`, `next`,
/// `prev`, `error`.
pub trait TableIterator {
    /// Whether the cursor currently rests on an entry.
    fn valid(&self) -> bool;

    /// The internal key (user key + 8-byte trailer) the cursor rests on.
    ///
    /// # Panics
    /// May panic if `!self.valid()`.
    fn key(&self) -> &[u8];

    /// The value bytes associated with the current entry.
    ///
    /// # Panics
    /// May panic if `!self.valid()`.
    fn value(&self) -> &[u8];

    /// Positions the cursor on the first entry, if any.
    fn seek_to_first(&mut self);

    /// Positions the cursor on the first entry whose key is `>= target` under the table's
    /// comparator.
    fn seek(&mut self, target: &[u8]);

    /// Advances to the next entry.
    ///
    /// # Panics
    /// May panic if `!self.valid()`.
    fn next(&mut self);

    /// Any error encountered while iterating. A well-behaved iterator becomes `!valid()` and
    /// sticky once an error has occurred.
    fn error(&self) -> Option<TableError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("table file is missing or unreadable: {0}")]
    Io(String),
    #[error("table file is corrupt: {0}")]
    Corrupt(String),
}

/// A table opened for reading: it can be iterated, and it exposes the range tombstones it
/// contains (spec.md §4.7 step 1).
pub trait TableReader {
    type Iter<'a>: TableIterator + 'a
    where
        Self: 'a;

    fn new_iterator(&self) -> Self::Iter<'_>;

    /// Range tombstones recorded in this table, in arbitrary order.
    fn range_tombstones(&self) -> &[RangeTombstone];

    fn file_size(&self) -> u64;
}

/// Used by a compaction job to materialize output SSTs.
pub trait TableBuilder {
    /// Appends an `(internal_key, value)` pair. Keys must be added in ascending internal-key
    /// order.
    fn add(&mut self, internal_key: &[u8], value: &[u8]);

    /// A heuristic estimate of the file size if `finish` were called now; used to decide when to
    /// roll over to a new output file.
    fn estimated_size(&self) -> u64;

    /// Number of entries added so far.
    fn num_entries(&self) -> u64;

    /// Finalizes the file, returning its exact size in bytes.
    fn finish(self) -> Result<u64, TableError>;
}

/// Hands out [`TableReader`]s by file number, deduplicating opens of the same file.
///
/// Every successful `get` must be balanced by a `release` (spec.md §6), so that a host cache can
/// track outstanding handles.
pub trait TableCache {
    type Reader: TableReader;

    fn get(&self, file_number: u64, path: &str) -> Result<Self::Reader, TableError>;

    fn release(&self, file_number: u64);
}

/// Opens a fresh [`TableBuilder`] for a compaction job's output file (spec.md §4.7 step 4). The
/// builder writes through whatever file handle the host's VFS opens at `path`; this crate does
/// not see the underlying file.
pub trait TableBuilderFactory {
    type Builder: TableBuilder;

    fn new_builder(&self, file_number: u64, path: &str) -> Result<Self::Builder, TableError>;
}
