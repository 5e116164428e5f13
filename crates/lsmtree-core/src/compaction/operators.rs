//! Pluggable compaction-job collaborators (spec.md §4.7): the compaction filter, merge operator,
//! rate limiter, and output file-number allocator. All optional; `CompactionJob::run` degrades to
//! direct pass-through emission when none are installed.

/// What to do with a `(user_key, value)` pair a [`CompactionFilter`] was shown.
#[derive(Debug, Clone)]
pub enum FilterDecision {
    Keep,
    Remove,
    Change(Vec<u8>),
}

/// Called once per eligible record during a compaction (spec.md §4.7 step 3b). Never called on
/// `SingleDeletion` or `RangeDeletion` entries, which are internal control records.
///
/// `Sync` so a single filter instance can be shared across a parallel subcompaction's worker
/// threads (spec.md §4.8).
pub trait CompactionFilter: Sync {
    fn filter(&self, output_level: i32, user_key: &[u8], value: &[u8]) -> FilterDecision;
}

/// User-defined associative merge, invoked to flush an accumulated run of `Merge` operands
/// (spec.md §4.7 step 3c, P9).
pub trait MergeOperator: Sync {
    /// `operands` is oldest-first. Returns the merged value, or an error string that aborts the
    /// compaction job with [`crate::error::CompactionError::MergeOperatorFailed`].
    fn full_merge(&self, user_key: &[u8], base_value: Option<&[u8]>, operands: &[Vec<u8>]) -> Result<Vec<u8>, String>;
}

/// Throttles compaction output writes (spec.md §4.7 step 5). Called with the output file's final
/// size just before it is synced.
pub trait RateLimiter: Sync {
    fn request(&self, bytes: u64);
}

/// Allocates the next on-disk file number for a compaction output file (spec.md §4.4's
/// `next_file_number` counter, shared with `VersionSet`). `Sync` so subcompaction workers can
/// share one allocator (spec.md §4.8).
pub trait FileNumberAllocator: Sync {
    fn next_file_number(&self) -> crate::format::FileNumber;
}

/// Allocates the monotonically increasing `epoch_number` stamped on every newly-created SST
/// (RocksDB's allocation discipline, not present in classic LevelDB). `Sync` for the same reason
/// as [`FileNumberAllocator`].
pub trait EpochAllocator: Sync {
    fn next_epoch_number(&self) -> u64;
}
