//! Parallel subcompaction (spec.md §4.8): splits one compaction's input key range into disjoint
//! user-key partitions and runs each through [`job::run_bounded`] on its own thread, merging the
//! results back into `compaction.edit` in partition order. Falls back to the single-threaded
//! [`job::run`] when the input key range is too narrow to produce at least two useful partitions.
//!
//! Grounded on the teacher's `anchored-leveldb` concurrency conventions (`parking_lot::Mutex` for
//! shared state, plain `std::thread` for worker fan-out) generalized to a structured, one-shot
//! join via `std::thread::scope` — no persistent thread pool is needed since a subcompaction's
//! workers all complete before the call returns.

use std::sync::Arc;

use parking_lot::Mutex;

use lsmtree_vfs::Filesystem;
use lsmtree_table::{TableBuilderFactory, TableCache};

use crate::compaction::descriptor::Compaction;
use crate::compaction::job::{self, JobContext, KeyBounds};
use crate::error::Error;
use crate::file_metadata::{FileMetaData, LeveledFile};
use crate::level::Level;
use crate::manifest::sst_path;

struct Partition {
    inputs: Vec<LeveledFile>,
    bounds: KeyBounds,
}

/// Runs `compaction`, parallelizing across up to `num_subcompactions` worker threads when the
/// input key range has enough distinct boundaries to make that worthwhile (spec.md §4.8).
/// Otherwise behaves exactly like [`job::run`].
pub fn run<FS, TC, BF>(
    compaction: &mut Compaction,
    num_subcompactions: usize,
    ctx: &JobContext<'_, FS, TC, BF>,
) -> Result<(), Error>
where
    FS: Filesystem + Sync,
    TC: TableCache + Sync,
    BF: TableBuilderFactory + Sync,
{
    if compaction.is_trivial_move {
        return job::run(compaction, ctx);
    }

    let boundaries = downsampled_boundaries(compaction, num_subcompactions);
    if boundaries.len() < 3 {
        return job::run(compaction, ctx);
    }

    let partitions: Vec<Partition> = (0..boundaries.len() - 1)
        .map(|i| {
            let start = if i == 0 { None } else { Some(boundaries[i].clone()) };
            let end = if i == boundaries.len() - 2 { None } else { Some(boundaries[i + 1].clone()) };
            let inputs = compaction
                .inputs
                .iter()
                .filter(|f| overlaps_partition(f, start.as_deref(), end.as_deref()))
                .cloned()
                .collect();
            Partition { inputs, bounds: KeyBounds { start, end } }
        })
        .collect();

    let output_level = Level(compaction.output_level.max(0) as u32);
    let max_output_file_size = compaction.max_output_file_size;
    let first_error: Mutex<Option<Error>> = Mutex::new(None);
    let results: Mutex<Vec<Option<Vec<(Level, Arc<FileMetaData>)>>>> = Mutex::new(vec![None; partitions.len()]);

    std::thread::scope(|scope| {
        for (idx, partition) in partitions.iter().enumerate() {
            let first_error = &first_error;
            let results = &results;
            scope.spawn(move || match job::run_bounded(
                &partition.inputs,
                output_level,
                max_output_file_size,
                &partition.bounds,
                ctx,
            ) {
                Ok(outputs) => results.lock()[idx] = Some(outputs),
                Err(e) => {
                    first_error.lock().get_or_insert(e);
                }
            });
        }
    });

    let results = results.into_inner();
    if let Some(err) = first_error.into_inner() {
        for outputs in results.into_iter().flatten() {
            for (_, file) in outputs {
                let path = sst_path(ctx.db_path, file.file_number());
                let _ = ctx.fs.remove(&path);
            }
        }
        return Err(err);
    }

    compaction.add_input_deletions();
    for outputs in results.into_iter().flatten() {
        for (level, file) in outputs {
            compaction.edit.add_file(level, file);
        }
    }
    Ok(())
}

/// Collects every file's smallest/largest user key plus the compaction's overall bounds, dedupes
/// and sorts them, then downsamples to at most `num_subcompactions + 1` points, always keeping
/// the final one (spec.md §4.8).
fn downsampled_boundaries(compaction: &Compaction, num_subcompactions: usize) -> Vec<Vec<u8>> {
    let mut boundaries: Vec<Vec<u8>> = compaction
        .input_files()
        .flat_map(|f| [f.smallest_user_key().to_vec(), f.largest_user_key().to_vec()])
        .collect();
    boundaries.extend(compaction.smallest_user_key().map(<[u8]>::to_vec));
    boundaries.extend(compaction.largest_user_key().map(<[u8]>::to_vec));
    boundaries.sort_unstable();
    boundaries.dedup();

    let target = num_subcompactions.max(1) + 1;
    if boundaries.len() <= target {
        return boundaries;
    }

    let last = boundaries.last().cloned().expect("non-empty: at least one input file");
    let step = (boundaries.len() - 1) as f64 / (target - 1) as f64;
    let mut sampled: Vec<Vec<u8>> =
        (0..target - 1).map(|i| boundaries[(i as f64 * step).round() as usize].clone()).collect();
    sampled.push(last);
    sampled.dedup();
    sampled
}

/// Whether `file`'s `[smallest, largest]` user-key range intersects `[start, end)`.
fn overlaps_partition(file: &LeveledFile, start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    let entirely_after_end = end.is_some_and(|e| file.file.smallest_user_key() >= e);
    let entirely_before_start = start.is_some_and(|s| file.file.largest_user_key() < s);
    !entirely_after_end && !entirely_before_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::descriptor::CompactionReason;
    use crate::compaction::operators::FileNumberAllocator;
    use crate::file_metadata::{FileAttributes, FileDescriptor};
    use crate::format::{EntryType, FileNumber, InternalKey};
    use lsmtree_table::{MemoryTableBuilderFactory, MemoryTableCache, MemoryTableReader};
    use std::path::Path;

    struct CountingAllocator {
        next: std::sync::atomic::AtomicU64,
    }
    impl CountingAllocator {
        fn starting_at(n: u64) -> Self {
            Self { next: std::sync::atomic::AtomicU64::new(n) }
        }
    }
    impl FileNumberAllocator for CountingAllocator {
        fn next_file_number(&self) -> FileNumber {
            FileNumber(self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }
    }

    fn input_file(num: u64, keys: &[&[u8]], cache: &MemoryTableCache) -> LeveledFile {
        let entries: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (InternalKey::new(k, i as u64 + 1, EntryType::Value).into_bytes(), b"v".to_vec()))
            .collect();
        let smallest = InternalKey::new(keys[0], 1, EntryType::Value);
        let largest = InternalKey::new(keys[keys.len() - 1], keys.len() as u64, EntryType::Value);
        cache.insert(num, MemoryTableReader::new(entries, Vec::new()));
        LeveledFile {
            level: Level(0),
            file: FileMetaData::new(
                FileDescriptor::new(FileNumber(num), 100),
                smallest,
                largest,
                1,
                keys.len() as u64,
                FileAttributes::default(),
            ),
        }
    }

    #[test]
    fn narrow_key_range_falls_back_to_single_threaded() {
        let cache = MemoryTableCache::new();
        let inputs = vec![input_file(1, &[b"a", b"a"], &cache)];
        let mut compaction = Compaction::new(inputs, 1, 1 << 20, 1.0, CompactionReason::LevelMaxLevelSize);

        let fs = lsmtree_vfs::MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let builder_factory = MemoryTableBuilderFactory::new(MemoryTableCache::new());
        let allocator = CountingAllocator::starting_at(10);
        let ctx = JobContext {
            db_path,
            fs: &fs,
            table_cache: &cache,
            builder_factory: &builder_factory,
            file_numbers: &allocator,
            epoch_numbers: None,
            earliest_snapshot: None,
            rate_limiter: None,
            filter: None,
            merge_operator: None,
        };

        run(&mut compaction, 4, &ctx).expect("should fall back to single-threaded job");
        assert_eq!(compaction.edit.new_files.len(), 1);
    }

    #[test]
    fn wide_key_range_partitions_and_merges_every_key_exactly_once() {
        let cache = MemoryTableCache::new();
        let inputs = vec![
            input_file(1, &[b"a", b"m"], &cache),
            input_file(2, &[b"b", b"f"], &cache),
            input_file(3, &[b"d", b"z"], &cache),
        ];
        let mut compaction = Compaction::new(inputs, 1, 1 << 20, 1.0, CompactionReason::LevelMaxLevelSize);

        let fs = lsmtree_vfs::MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let builder_factory = MemoryTableBuilderFactory::new(MemoryTableCache::new());
        let allocator = CountingAllocator::starting_at(10);
        let ctx = JobContext {
            db_path,
            fs: &fs,
            table_cache: &cache,
            builder_factory: &builder_factory,
            file_numbers: &allocator,
            epoch_numbers: None,
            earliest_snapshot: None,
            rate_limiter: None,
            filter: None,
            merge_operator: None,
        };

        run(&mut compaction, 3, &ctx).expect("parallel subcompaction should succeed");

        let mut seen_keys: Vec<Vec<u8>> = Vec::new();
        for (_, file) in &compaction.edit.new_files {
            seen_keys.push(file.smallest_key().user_key().to_vec());
            if file.smallest_key().user_key() != file.largest_key().user_key() {
                seen_keys.push(file.largest_key().user_key().to_vec());
            }
        }
        seen_keys.sort();
        seen_keys.dedup();
        assert_eq!(
            seen_keys,
            vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec(), b"f".to_vec(), b"m".to_vec(), b"z".to_vec()]
        );
        assert_eq!(compaction.edit.deleted_files.len(), 3, "every input file is deleted exactly once");
    }

    #[test]
    fn boundary_downsampling_always_keeps_the_final_boundary() {
        let cache = MemoryTableCache::new();
        let inputs = vec![
            input_file(1, &[b"a", b"c"], &cache),
            input_file(2, &[b"e", b"g"], &cache),
            input_file(3, &[b"i", b"k"], &cache),
            input_file(4, &[b"m", b"z"], &cache),
        ];
        let compaction = Compaction::new(inputs, 1, 1 << 20, 1.0, CompactionReason::LevelMaxLevelSize);

        let boundaries = downsampled_boundaries(&compaction, 2);
        assert!(boundaries.len() <= 3);
        assert_eq!(boundaries.last(), Some(&b"z".to_vec()));
    }
}
