//! `FileMetaData`: immutable per-SST metadata, shared read-only across concurrently-live
//! `Version`s via `Arc`. Grounded on the teacher's `file_tracking::file_metadata::FileMetadata`,
//! generalized from classic LevelDB's seek-compaction-triggering metadata to the RocksDB-lineage
//! attribute set spec.md §3 names (temperature, epoch, checksum, blob-file linkage, ...). The
//! teacher's `remaining_seeks`/seek-compaction machinery has no counterpart in spec.md (which
//! drives compaction purely off level scores) and is dropped; see DESIGN.md.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::format::{EncodedInternalKey, FileNumber, InternalKey};
use crate::level::Level;

/// `(file_number, path_id)`, packed per spec.md §3. `path_id` is always 0 in this crate; no
/// multi-path DB directory support is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    pub file_number: FileNumber,
    pub path_id: u8,
    pub file_size: u64,
}

impl FileDescriptor {
    #[must_use]
    pub fn new(file_number: FileNumber, file_size: u64) -> Self {
        Self { file_number, path_id: 0, file_size }
    }
}

/// Optional per-file attributes carried by `NewFile4` sub-tags (spec.md §4.1). Plain `Option`s
/// rather than a bespoke presence-bitset, since the codec module is what actually needs to know
/// which sub-tags were present on the wire.
#[derive(Debug, Clone, Default)]
pub struct FileAttributes {
    pub needs_compaction: bool,
    pub oldest_blob_file_number: Option<u64>,
    pub oldest_ancestor_time: Option<u64>,
    pub file_creation_time: Option<u64>,
    pub file_checksum: Option<Vec<u8>>,
    pub checksum_func_name: Option<String>,
    pub temperature: Option<u8>,
    pub epoch_number: Option<u64>,
    pub compensated_range_del_size: Option<u64>,
    pub tail_size: Option<u64>,
    pub user_defined_timestamps_persisted: Option<bool>,
    /// Sub-tags not recognized by this build but marked safe-to-ignore (bit 6 set), preserved
    /// verbatim so re-encoding a `NewFile4` entry round-trips (spec.md §4.1, §9).
    pub unknown_subtags: Vec<(u64, Vec<u8>)>,
}

/// Metadata for one immutable SST. Constructed once, then shared by `Arc` across every `Version`
/// that references the file; the only field ever mutated after construction is
/// [`FileMetaData::being_compacted`], which is atomic so it needs no additional lock to read or
/// flip (spec.md §3, §5, §9).
#[derive(Debug)]
pub struct FileMetaData {
    pub descriptor: FileDescriptor,
    pub smallest: InternalKey,
    pub largest: InternalKey,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
    pub attributes: FileAttributes,
    being_compacted: AtomicBool,
}

impl FileMetaData {
    #[must_use]
    pub fn new(
        descriptor: FileDescriptor,
        smallest: InternalKey,
        largest: InternalKey,
        smallest_seqno: u64,
        largest_seqno: u64,
        attributes: FileAttributes,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            smallest,
            largest,
            smallest_seqno,
            largest_seqno,
            attributes,
            being_compacted: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn file_number(&self) -> FileNumber {
        self.descriptor.file_number
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.descriptor.file_size
    }

    #[must_use]
    pub fn smallest_key(&self) -> EncodedInternalKey<'_> {
        self.smallest.as_ref()
    }

    #[must_use]
    pub fn largest_key(&self) -> EncodedInternalKey<'_> {
        self.largest.as_ref()
    }

    #[must_use]
    pub fn smallest_user_key(&self) -> &[u8] {
        self.smallest.as_ref().user_key()
    }

    #[must_use]
    pub fn largest_user_key(&self) -> &[u8] {
        self.largest.as_ref().user_key()
    }

    /// Whether `[begin, end]` (internal-key bounds, `None` meaning unbounded) overlaps this
    /// file's `[smallest, largest]` range (spec.md §4.2).
    #[must_use]
    pub fn overlaps(&self, begin: Option<EncodedInternalKey<'_>>, end: Option<EncodedInternalKey<'_>>) -> bool {
        let after_end = end.is_some_and(|end| self.smallest_key() > end);
        let before_begin = begin.is_some_and(|begin| self.largest_key() < begin);
        !after_end && !before_begin
    }

    #[must_use]
    pub fn being_compacted(&self) -> bool {
        self.being_compacted.load(Ordering::Acquire)
    }

    pub fn set_being_compacted(&self, value: bool) {
        self.being_compacted.store(value, Ordering::Release);
    }
}

/// A file plus the level it currently lives in; the unit the pickers and `Compaction` operate
/// over.
#[derive(Debug, Clone)]
pub struct LeveledFile {
    pub level: Level,
    pub file: Arc<FileMetaData>,
}
