//! FIFO compaction (spec.md §4.6.3): no merging, just deletion by age or total size, plus an
//! optional intra-L0 merge. All FIFO files live at L0; `output_level` is the sentinel `-1` for a
//! pure deletion compaction (no SST output, only MANIFEST delete entries).

use crate::compaction::descriptor::{Compaction, CompactionReason};
use crate::config::Options;
use crate::file_metadata::LeveledFile;
use crate::level::Level;
use crate::version::Version;

/// Age proxy: `file_creation_time` when known, else `smallest_seqno` (spec.md §4.6.3).
fn age_key(file: &crate::file_metadata::FileMetaData) -> u64 {
    file.attributes.file_creation_time.unwrap_or(file.smallest_seqno)
}

#[must_use]
pub fn needs_compaction(version: &Version, opts: &Options) -> bool {
    pick_compaction(version, opts).is_some()
}

#[must_use]
pub fn pick_compaction(version: &Version, opts: &Options) -> Option<Compaction> {
    let files: Vec<_> = version.files(0).iter().filter(|f| !f.being_compacted()).cloned().collect();
    if files.is_empty() {
        return None;
    }

    if opts.fifo_ttl_seconds > 0 {
        if let Some(c) = pick_ttl_deletions(&files, opts) {
            return Some(c);
        }
    }

    if let Some(c) = pick_size_deletions(&files, opts) {
        return Some(c);
    }

    if opts.fifo_allow_compaction {
        return pick_intra_l0_merge(&files, opts);
    }

    None
}

/// Deletes every file whose `file_creation_time` is older than `fifo_ttl_seconds` ago. Files
/// with no recorded creation time are not eligible for TTL deletion (spec.md §4.6.3) and fall
/// through to the size-based pass instead.
fn pick_ttl_deletions(files: &[std::sync::Arc<crate::file_metadata::FileMetaData>], opts: &Options) -> Option<Compaction> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let cutoff = now.saturating_sub(opts.fifo_ttl_seconds);

    let mut expired: Vec<_> = files
        .iter()
        .filter(|f| f.attributes.file_creation_time.is_some_and(|t| t < cutoff))
        .cloned()
        .collect();
    if expired.is_empty() {
        return None;
    }

    expired.sort_by_key(|f| f.attributes.file_creation_time.unwrap_or(0));
    let inputs = expired.into_iter().map(|f| LeveledFile { level: Level(0), file: f }).collect();

    let mut c = Compaction::new(inputs, -1, 0, 1.0, CompactionReason::FifoTtl);
    c.is_deletion_compaction = true;
    c.add_input_deletions();
    Some(c)
}

fn pick_size_deletions(files: &[std::sync::Arc<crate::file_metadata::FileMetaData>], opts: &Options) -> Option<Compaction> {
    let total: u64 = files.iter().map(|f| f.file_size()).sum();
    if total <= opts.fifo_max_table_files_size {
        return None;
    }

    let mut sorted: Vec<_> = files.to_vec();
    sorted.sort_by_key(|f| age_key(f));

    let mut running = total;
    let mut to_delete = Vec::new();
    for f in sorted {
        if running <= opts.fifo_max_table_files_size {
            break;
        }
        running -= f.file_size();
        to_delete.push(LeveledFile { level: Level(0), file: f });
    }

    if to_delete.is_empty() {
        return None;
    }

    let mut c = Compaction::new(to_delete, -1, 0, 1.0, CompactionReason::FifoMaxSize);
    c.is_deletion_compaction = true;
    c.add_input_deletions();
    Some(c)
}

fn pick_intra_l0_merge(files: &[std::sync::Arc<crate::file_metadata::FileMetaData>], opts: &Options) -> Option<Compaction> {
    let mut sorted: Vec<_> = files.to_vec();
    sorted.sort_by_key(|f| age_key(f));
    let count = sorted.len().clamp(2, 10);
    if sorted.len() < 2 {
        return None;
    }
    let inputs = sorted
        .into_iter()
        .take(count)
        .map(|f| LeveledFile { level: Level(0), file: f })
        .collect();
    Some(Compaction::new(inputs, 0, opts.target_file_size_for_level(0), 1.0, CompactionReason::FifoReduceNumFiles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_metadata::{FileAttributes, FileDescriptor, FileMetaData};
    use crate::format::{EntryType, FileNumber, InternalKey};

    fn file(num: u64, size: u64, seq: u64) -> std::sync::Arc<FileMetaData> {
        FileMetaData::new(
            FileDescriptor::new(FileNumber(num), size),
            InternalKey::new(b"a", seq, EntryType::Value),
            InternalKey::new(b"z", seq, EntryType::Value),
            seq,
            seq,
            FileAttributes::default(),
        )
    }

    #[test]
    fn deletes_oldest_files_until_under_size_limit() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, 400, 1)); // oldest
        v.files_mut(0).push(file(2, 400, 2));
        v.files_mut(0).push(file(3, 400, 3)); // newest
        let opts = Options { fifo_max_table_files_size: 800, ..Options::default() };

        let c = pick_compaction(&v, &opts).expect("over the size limit");
        assert!(c.is_deletion_compaction);
        assert_eq!(c.output_level, -1);
        assert_eq!(c.reason, CompactionReason::FifoMaxSize);
        assert_eq!(c.edit.deleted_files.len(), 1);
    }

    #[test]
    fn under_the_limit_with_compaction_disabled_does_nothing() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, 100, 1));
        let opts = Options::default();
        assert!(!needs_compaction(&v, &opts));
    }

    #[test]
    fn ttl_deletes_only_files_older_than_the_cutoff() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut v = Version::empty();

        let stale = FileMetaData::new(
            FileDescriptor::new(FileNumber(1), 100),
            InternalKey::new(b"a", 1, EntryType::Value),
            InternalKey::new(b"z", 1, EntryType::Value),
            1,
            1,
            FileAttributes { file_creation_time: Some(now - 1000), ..FileAttributes::default() },
        );
        let fresh = FileMetaData::new(
            FileDescriptor::new(FileNumber(2), 100),
            InternalKey::new(b"a", 2, EntryType::Value),
            InternalKey::new(b"z", 2, EntryType::Value),
            2,
            2,
            FileAttributes { file_creation_time: Some(now), ..FileAttributes::default() },
        );
        v.files_mut(0).push(stale);
        v.files_mut(0).push(fresh);

        let opts = Options { fifo_ttl_seconds: 100, ..Options::default() };
        let c = pick_compaction(&v, &opts).expect("the stale file should be picked for TTL deletion");
        assert_eq!(c.reason, CompactionReason::FifoTtl);
        assert_eq!(c.num_input_files(), 1);
        assert_eq!(c.inputs[0].file.file_number(), FileNumber(1));
    }
}
