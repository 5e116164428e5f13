//! `Compaction`: a typed description of an in-flight compaction (spec.md §4.5). Pickers build
//! one; `CompactionJob` executes it; on success its accumulated `edit` is handed to
//! `VersionSet::apply`.

use std::sync::Arc;

use crate::file_metadata::{FileMetaData, LeveledFile};
use crate::format::EncodedInternalKey;
use crate::level::Level;
use crate::version::edit::VersionEdit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionReason {
    LevelL0FileNumTrigger,
    LevelMaxLevelSize,
    UniversalSizeAmplification,
    UniversalSizeRatio,
    FifoTtl,
    FifoMaxSize,
    FifoReduceNumFiles,
    ManualCompaction,
}

#[derive(Debug)]
pub struct Compaction {
    /// Input files grouped by level, in the order the picker selected them. A leveled compaction
    /// has at most two groups (the start level, then the output level's overlap); universal and
    /// FIFO may have one group per participating run/level.
    pub inputs: Vec<LeveledFile>,
    pub output_level: i32,
    pub max_output_file_size: u64,
    pub edit: VersionEdit,
    pub is_trivial_move: bool,
    pub is_deletion_compaction: bool,
    pub score: f64,
    pub reason: CompactionReason,
}

impl Compaction {
    #[must_use]
    pub fn new(
        inputs: Vec<LeveledFile>,
        output_level: i32,
        max_output_file_size: u64,
        score: f64,
        reason: CompactionReason,
    ) -> Self {
        Self {
            inputs,
            output_level,
            max_output_file_size,
            edit: VersionEdit::new(),
            is_trivial_move: false,
            is_deletion_compaction: false,
            score,
            reason,
        }
    }

    /// The level of the first input file, or `-1` if there are no inputs (spec.md §4.5).
    #[must_use]
    pub fn start_level(&self) -> i32 {
        self.inputs.first().map_or(-1, |f| f.level.0 as i32)
    }

    #[must_use]
    pub fn num_input_files(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn input_files(&self) -> impl Iterator<Item = &Arc<FileMetaData>> {
        self.inputs.iter().map(|f| &f.file)
    }

    /// Flips `being_compacted` on every input file. Caller must hold the VersionSet lock
    /// (spec.md §4.5, §5).
    pub fn mark_files_being_compacted(&self, value: bool) {
        for f in &self.inputs {
            f.file.set_being_compacted(value);
        }
    }

    /// Inserts one delete entry per input file into `self.edit` (spec.md §4.5).
    pub fn add_input_deletions(&mut self) {
        for f in &self.inputs {
            self.edit.delete_file(f.level, f.file.file_number());
        }
    }

    #[must_use]
    pub fn smallest_key(&self) -> Option<EncodedInternalKey<'_>> {
        self.input_files().map(|f| f.smallest_key()).min()
    }

    #[must_use]
    pub fn largest_key(&self) -> Option<EncodedInternalKey<'_>> {
        self.input_files().map(|f| f.largest_key()).max()
    }

    #[must_use]
    pub fn smallest_user_key(&self) -> Option<&[u8]> {
        self.input_files().map(FileMetaData::smallest_user_key).min()
    }

    #[must_use]
    pub fn largest_user_key(&self) -> Option<&[u8]> {
        self.input_files().map(FileMetaData::largest_user_key).max()
    }

    /// True iff `smallest < largest` and at least 4 distinct user-key file boundaries exist
    /// across the inputs (spec.md §4.5) — the minimum needed for subcompaction to produce more
    /// than one useful partition.
    #[must_use]
    pub fn has_sufficient_key_range_for_subcompaction(&self) -> bool {
        let Some(smallest) = self.smallest_user_key() else { return false };
        let Some(largest) = self.largest_user_key() else { return false };
        if smallest >= largest {
            return false;
        }
        let mut boundaries: Vec<&[u8]> = self
            .input_files()
            .flat_map(|f| [f.smallest_user_key(), f.largest_user_key()])
            .collect();
        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries.len() >= 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_metadata::{FileAttributes, FileDescriptor};
    use crate::format::{EntryType, FileNumber, InternalKey};

    fn leveled(level: u32, num: u64, smallest: &[u8], largest: &[u8]) -> LeveledFile {
        LeveledFile {
            level: Level(level),
            file: FileMetaData::new(
                FileDescriptor::new(FileNumber(num), 1000),
                InternalKey::new(smallest, 1, EntryType::Value),
                InternalKey::new(largest, 1, EntryType::Value),
                1,
                1,
                FileAttributes::default(),
            ),
        }
    }

    #[test]
    fn start_level_and_num_input_files() {
        let c = Compaction::new(
            vec![leveled(0, 1, b"a", b"m"), leveled(0, 2, b"b", b"z")],
            1,
            1 << 26,
            1.0,
            CompactionReason::LevelL0FileNumTrigger,
        );
        assert_eq!(c.start_level(), 0);
        assert_eq!(c.num_input_files(), 2);
    }

    #[test]
    fn add_input_deletions_covers_every_input() {
        let mut c = Compaction::new(
            vec![leveled(0, 1, b"a", b"m")],
            1,
            1 << 26,
            1.0,
            CompactionReason::LevelL0FileNumTrigger,
        );
        c.add_input_deletions();
        assert_eq!(c.edit.deleted_files.len(), 1);
    }

    #[test]
    fn key_range_with_few_boundaries_is_insufficient_for_subcompaction() {
        let c = Compaction::new(
            vec![leveled(0, 1, b"a", b"z")],
            1,
            1 << 26,
            1.0,
            CompactionReason::LevelL0FileNumTrigger,
        );
        assert!(!c.has_sufficient_key_range_for_subcompaction());
    }

    #[test]
    fn key_range_with_many_distinct_boundaries_is_sufficient() {
        let c = Compaction::new(
            vec![
                leveled(0, 1, b"a", b"f"),
                leveled(0, 2, b"g", b"m"),
                leveled(0, 3, b"n", b"z"),
            ],
            1,
            1 << 26,
            1.0,
            CompactionReason::LevelL0FileNumTrigger,
        );
        assert!(c.has_sufficient_key_range_for_subcompaction());
    }
}
