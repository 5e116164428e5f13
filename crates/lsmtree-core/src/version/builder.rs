//! `Builder`: accumulates a sequence of edits against a base `Version` and produces the next one
//! (spec.md §4.3). Grounded on the shape of the teacher's in-memory version-building step inside
//! `version::set::VersionSet::apply` logic, pulled out as its own type since spec.md requires it
//! to be independently testable (P5).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::file_metadata::FileMetaData;
use crate::level::NUM_LEVELS;
use crate::version::edit::VersionEdit;
use crate::version::Version;

#[derive(Debug)]
pub struct Builder {
    added: Vec<BTreeMap<u64, Arc<FileMetaData>>>,
    deleted: Vec<HashSet<u64>>,
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            added: (0..NUM_LEVELS).map(|_| BTreeMap::new()).collect(),
            deleted: (0..NUM_LEVELS).map(|_| HashSet::new()).collect(),
        }
    }

    /// Applies one edit's file additions/deletions (spec.md §4.3). Deletes are processed first,
    /// then adds, so that an add and a delete of the same `file_num` within one edit resolves to
    /// "file present" (add wins).
    pub fn apply(&mut self, edit: &VersionEdit) {
        for &(level, file_number) in &edit.deleted_files {
            let level = level.0 as usize;
            if self.added[level].remove(&file_number.0).is_none() {
                // Not added within this builder; mark deleted against base. Tolerated even if
                // the file doesn't exist in base either (spec.md §4.3, RocksDB-compatible).
                self.deleted[level].insert(file_number.0);
            }
        }
        for (level, file) in &edit.new_files {
            let level = level.0 as usize;
            self.deleted[level].remove(&file.file_number().0);
            self.added[level].insert(file.file_number().0, Arc::clone(file));
        }
    }

    /// Applies `self`'s accumulated state onto `base`, producing the next `Version`: per level,
    /// base files minus deletions, plus added files, then sorted by the level's ordering rule.
    #[must_use]
    pub fn save_to(&self, base: &Version) -> Version {
        let mut result = Version::empty();

        for level in 0..NUM_LEVELS {
            let level_idx = level as usize;
            let mut files: Vec<Arc<FileMetaData>> = base
                .files(level)
                .iter()
                .filter(|f| !self.deleted[level_idx].contains(&f.file_number().0))
                .cloned()
                .collect();
            files.extend(self.added[level_idx].values().cloned());

            if level == 0 {
                files.sort_by_key(|f| f.file_number().0);
            } else {
                files.sort_by(|a, b| a.smallest_key().cmp(&b.smallest_key()));
            }

            *result.files_mut(level) = files;
        }

        result
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_metadata::{FileAttributes, FileDescriptor};
    use crate::format::{EntryType, FileNumber, InternalKey};
    use crate::level::Level;

    fn file(num: u64) -> Arc<FileMetaData> {
        FileMetaData::new(
            FileDescriptor::new(FileNumber(num), 1000),
            InternalKey::new(b"a", 1, EntryType::Value),
            InternalKey::new(b"z", 1, EntryType::Value),
            1,
            1,
            FileAttributes::default(),
        )
    }

    #[test]
    fn add_then_delete_same_file_in_one_edit_leaves_file_present() {
        let mut edit = VersionEdit::new();
        edit.add_file(Level(0), file(1));
        edit.delete_file(Level(0), FileNumber(1));

        let mut builder = Builder::new();
        builder.apply(&edit);

        let result = builder.save_to(&Version::empty());
        assert_eq!(result.num_files(0), 1, "add wins over delete within the same edit");
    }

    #[test]
    fn delete_then_add_across_two_edits_yields_second_edit_metadata() {
        let base = {
            let mut edit = VersionEdit::new();
            edit.add_file(Level(0), file(1));
            let mut b = Builder::new();
            b.apply(&edit);
            b.save_to(&Version::empty())
        };

        let mut e1 = VersionEdit::new();
        e1.delete_file(Level(0), FileNumber(1));
        let mut e2 = VersionEdit::new();
        let replacement = file(1);
        e2.add_file(Level(0), Arc::clone(&replacement));

        let mut builder = Builder::new();
        builder.apply(&e1);
        builder.apply(&e2);

        let result = builder.save_to(&base);
        assert_eq!(result.num_files(0), 1);
        assert!(Arc::ptr_eq(&result.files(0)[0], &replacement));
    }

    #[test]
    fn delete_of_nonexistent_file_is_tolerated() {
        let mut edit = VersionEdit::new();
        edit.delete_file(Level(0), FileNumber(999));
        let mut builder = Builder::new();
        builder.apply(&edit);
        let result = builder.save_to(&Version::empty());
        assert_eq!(result.num_files(0), 0);
    }

    #[test]
    fn duplicate_deletes_are_idempotent() {
        let base = {
            let mut edit = VersionEdit::new();
            edit.add_file(Level(0), file(1));
            let mut b = Builder::new();
            b.apply(&edit);
            b.save_to(&Version::empty())
        };

        let mut e1 = VersionEdit::new();
        e1.delete_file(Level(0), FileNumber(1));
        let mut e2 = VersionEdit::new();
        e2.delete_file(Level(0), FileNumber(1));

        let mut builder = Builder::new();
        builder.apply(&e1);
        builder.apply(&e2);
        let result = builder.save_to(&base);
        assert_eq!(result.num_files(0), 0);
    }

    #[test]
    fn l0_sorts_by_file_number_l1_sorts_by_smallest_key() {
        let mut edit = VersionEdit::new();
        edit.add_file(Level(0), file(3));
        edit.add_file(Level(0), file(1));
        edit.add_file(Level(0), file(2));
        let mut builder = Builder::new();
        builder.apply(&edit);
        let result = builder.save_to(&Version::empty());
        let numbers: Vec<_> = result.files(0).iter().map(|f| f.file_number().0).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
