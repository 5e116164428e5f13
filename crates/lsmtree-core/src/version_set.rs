//! `VersionSet`: owns the current `Version`, the MANIFEST writer, and the durability protocol
//! that ties the two together (spec.md §4.4). Grounded on the teacher's database-open/recover
//! sequencing (temp-file write, fsync, rename, directory sync, in that order) but restructured
//! around a single `parking_lot::Mutex<State>` rather than the teacher's split locks, since this
//! crate's `apply` is a single critical section end to end (spec.md §5: "a spec-compliant simple
//! implementation holds it straight through").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use lsmtree_vfs::Filesystem;

use crate::compaction::descriptor::Compaction;
use crate::compaction::operators::{EpochAllocator, FileNumberAllocator};
use crate::compaction::pickers::leveled::pick_manual_compaction;
use crate::config::Options;
use crate::error::{Error, ManifestError};
use crate::format::{comparator_names_equivalent, FileNumber};
use crate::level::{Level, NUM_LEVELS};
use crate::manifest::{current_path, manifest_path, parse_current_contents, write_current};
use crate::version::builder::Builder;
use crate::version::edit::VersionEdit;
use crate::version::Version;
use crate::write_log::reader::StrictFramedReader;
use crate::write_log::writer::FramedWriter;

struct State<FS: Filesystem> {
    current: Arc<Version>,
    versions: Vec<Weak<Version>>,
    manifest_file_number: FileNumber,
    manifest_writer: Option<FramedWriter<FS::WriteFile>>,
    manifest_size: u64,
    log_number: u64,
    prev_log_number: u64,
    column_families: BTreeMap<u32, String>,
    max_cf: u32,
}

/// Owns one database's file inventory and MANIFEST (spec.md §4.4). `FS` is the host's chosen
/// [`Filesystem`] implementation; a `VersionSet` is not generic over a table cache or builder
/// factory, since those belong to the compaction job, not to version bookkeeping.
pub struct VersionSet<FS: Filesystem> {
    fs: FS,
    db_path: PathBuf,
    options: Options,
    next_file_number: AtomicU64,
    last_sequence: AtomicU64,
    /// Next value `next_epoch_number` will hand out (spec.md's supplemented epoch bookkeeping).
    epoch: AtomicU64,
    state: Mutex<State<FS>>,
}

impl<FS: Filesystem> VersionSet<FS> {
    /// Initializes a fresh database: an empty `Version`, a new MANIFEST carrying the initial
    /// snapshot record, and `CURRENT` pointing to it (spec.md §4.4 `Create`).
    pub fn create(fs: FS, db_path: impl Into<PathBuf>, options: Options) -> Result<Self, Error> {
        let db_path = db_path.into();
        let state = State {
            current: Arc::new(Version::empty()),
            versions: Vec::new(),
            manifest_file_number: FileNumber(0),
            manifest_writer: None,
            manifest_size: 0,
            log_number: 0,
            prev_log_number: 0,
            column_families: BTreeMap::new(),
            max_cf: 0,
        };

        let vset = Self {
            fs,
            db_path,
            options,
            next_file_number: AtomicU64::new(1),
            last_sequence: AtomicU64::new(0),
            epoch: AtomicU64::new(1),
            state: Mutex::new(state),
        };

        let mut guard = vset.state.lock();
        vset.open_new_manifest(&mut guard)?;
        drop(guard);

        tracing::info!(db_path = %vset.db_path.display(), "created fresh database");
        Ok(vset)
    }

    /// Rebuilds state by replaying the MANIFEST named by `CURRENT` (spec.md §4.4 `Recover`).
    pub fn recover(fs: FS, db_path: impl Into<PathBuf>, options: Options) -> Result<Self, Error> {
        let db_path = db_path.into();
        let span = tracing::info_span!("recover", db_path = %db_path.display());
        let _enter = span.enter();

        let mut current_contents = String::new();
        {
            use std::io::Read as _;
            fs.open(&current_path(&db_path))
                .map_err(|e| Error::io("open CURRENT", e))?
                .read_to_string(&mut current_contents)
                .map_err(|e| Error::io("read CURRENT", e))?;
        }
        let manifest_number = parse_current_contents(&current_contents)?;

        let manifest_file = fs
            .open(&manifest_path(&db_path, manifest_number))
            .map_err(|e| Error::io("open MANIFEST", e))?;
        let mut reader = StrictFramedReader::new(manifest_file);

        let mut builder = Builder::new();
        let mut log_number: Option<u64> = None;
        let mut prev_log_number: u64 = 0;
        let mut last_sequence: Option<u64> = None;
        let mut next_file_number_seen: Option<u64> = None;
        let mut max_file_number_seen: u64 = 0;
        let mut max_epoch_seen: u64 = 0;
        let mut column_families = BTreeMap::new();
        let mut max_cf: u32 = 0;

        while let Some(record) = reader.next_record()? {
            let edit = VersionEdit::decode(&record)?;

            if let Some(recorded) = &edit.comparator_name {
                if !comparator_names_equivalent(&options.comparator_name, recorded) {
                    return Err(ManifestError::ComparatorMismatch {
                        configured: options.comparator_name.clone(),
                        recorded: recorded.clone(),
                    }
                    .into());
                }
            }

            if let Some(n) = edit.log_number {
                log_number = Some(n);
            }
            if let Some(n) = edit.prev_log_number {
                prev_log_number = n;
            }
            if let Some(n) = edit.last_sequence {
                last_sequence = Some(n);
            }
            if let Some(n) = edit.next_file_number {
                next_file_number_seen = Some(n);
            }

            apply_column_family_tags(&mut column_families, &mut max_cf, &edit);

            for (_, file) in &edit.new_files {
                max_file_number_seen = max_file_number_seen.max(file.file_number().0);
                if let Some(epoch) = file.attributes.epoch_number {
                    max_epoch_seen = max_epoch_seen.max(epoch);
                }
            }
            for &(_, file_number) in &edit.deleted_files {
                max_file_number_seen = max_file_number_seen.max(file_number.0);
            }

            builder.apply(&edit);
        }

        let log_number = log_number
            .ok_or_else(|| ManifestError::InvalidManifest("missing required LogNumber".into()))?;
        let last_sequence = last_sequence
            .ok_or_else(|| ManifestError::InvalidManifest("missing required LastSequence".into()))?;

        let next_file_number = next_file_number_seen
            .unwrap_or(0)
            .max(max_file_number_seen + 1)
            .max(manifest_number.0 + 1);

        let current = Arc::new(builder.save_to(&Version::empty()));
        tracing::debug!(
            total_files = current.total_files(),
            next_file_number,
            last_sequence,
            "MANIFEST replay complete"
        );

        let manifest_size = fs.stat(&manifest_path(&db_path, manifest_number)).unwrap_or(0);
        let manifest_writer = FramedWriter::new(
            fs.open_append(&manifest_path(&db_path, manifest_number))
                .map_err(|e| Error::io("reopen MANIFEST for append", e))?,
        );

        let state = State {
            current,
            versions: Vec::new(),
            manifest_file_number: manifest_number,
            manifest_writer: Some(manifest_writer),
            manifest_size,
            log_number,
            prev_log_number,
            column_families,
            max_cf,
        };

        Ok(Self {
            fs,
            db_path,
            options,
            next_file_number: AtomicU64::new(next_file_number),
            last_sequence: AtomicU64::new(last_sequence),
            epoch: AtomicU64::new(max_epoch_seen + 1),
            state: Mutex::new(state),
        })
    }

    /// The currently-installed `Version`. Cheap: clones an `Arc`.
    #[must_use]
    pub fn current(&self) -> Arc<Version> {
        self.state.lock().current.clone()
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn log_number(&self) -> u64 {
        self.state.lock().log_number
    }

    #[must_use]
    pub fn prev_log_number(&self) -> u64 {
        self.state.lock().prev_log_number
    }

    #[must_use]
    pub fn manifest_file_number(&self) -> FileNumber {
        self.state.lock().manifest_file_number
    }

    #[must_use]
    pub fn column_family_name(&self, id: u32) -> Option<String> {
        self.state.lock().column_families.get(&id).cloned()
    }

    #[must_use]
    pub fn max_column_family(&self) -> u32 {
        self.state.lock().max_cf
    }

    /// Commits `edit`: builds the next `Version`, appends the encoded edit to the MANIFEST,
    /// fsyncs it, rotates the MANIFEST and flips `CURRENT` if needed, then installs the new
    /// `Version` as current (spec.md §4.4 `Apply`, the durability protocol's critical section).
    pub fn apply(&self, edit: VersionEdit) -> Result<(), Error> {
        let mut state = self.state.lock();
        let span = tracing::info_span!(
            "apply",
            new_files = edit.new_files.len(),
            deleted_files = edit.deleted_files.len()
        );
        let _enter = span.enter();

        let mut builder = Builder::new();
        builder.apply(&edit);
        let new_version = builder.save_to(&state.current);

        let mut edit = edit;
        edit.next_file_number = Some(self.next_file_number.load(Ordering::Acquire));

        if let Some(seq) = edit.last_sequence {
            self.last_sequence.fetch_max(seq, Ordering::AcqRel);
        }
        if let Some(n) = edit.log_number {
            state.log_number = n;
        }
        if let Some(n) = edit.prev_log_number {
            state.prev_log_number = n;
        }
        apply_column_family_tags(&mut state.column_families, &mut state.max_cf, &edit);

        let encoded = edit.encode();

        if state.manifest_writer.is_none() || state.manifest_size >= self.options.max_manifest_file_size {
            tracing::debug!("rotating MANIFEST");
            self.open_new_manifest(&mut state)?;
        }

        let writer = state.manifest_writer.as_mut().expect("just ensured a MANIFEST is open");
        writer.add_record(&encoded).map_err(|e| Error::io("append MANIFEST record", e))?;
        writer.sync().map_err(|e| Error::io("fsync MANIFEST", e))?;
        state.manifest_size += encoded.len() as u64;

        state.current = Arc::new(new_version);
        state.versions.push(Arc::downgrade(&state.current));
        state.versions.retain(|v| v.strong_count() > 0);

        tracing::debug!(last_sequence = self.last_sequence(), "applied version edit");
        Ok(())
    }

    /// Opens a brand-new MANIFEST file, writes a full snapshot record of the current state into
    /// it, then flips `CURRENT` to point at it (spec.md §4.4). Called both by `create` (the very
    /// first MANIFEST) and by `apply` when rotation is triggered.
    fn open_new_manifest(&self, state: &mut State<FS>) -> Result<(), Error> {
        let manifest_number = FileNumber(self.next_file_number.fetch_add(1, Ordering::AcqRel));
        let path = manifest_path(&self.db_path, manifest_number);

        let file = self.fs.create(&path).map_err(|e| Error::io("create MANIFEST", e))?;
        let mut writer = FramedWriter::new(file);

        let snapshot = self.build_snapshot_edit(state);
        let encoded = snapshot.encode();
        writer
            .add_record(&encoded)
            .map_err(|e| Error::io("write MANIFEST snapshot record", e))?;
        writer.sync().map_err(|e| Error::io("fsync MANIFEST snapshot", e))?;

        write_current(&self.fs, &self.db_path, manifest_number)?;

        state.manifest_file_number = manifest_number;
        state.manifest_writer = Some(writer);
        state.manifest_size = encoded.len() as u64;

        tracing::info!(manifest = %manifest_number, "opened new MANIFEST");
        Ok(())
    }

    /// A synthetic `VersionEdit` carrying `Comparator`, `LogNumber`, `NextFileNumber`,
    /// `LastSequence`, and one `NewFile` entry per file in every level of `state.current`
    /// (spec.md §4.4 "Snapshot record").
    fn build_snapshot_edit(&self, state: &State<FS>) -> VersionEdit {
        let mut edit = VersionEdit::new();
        edit.comparator_name = Some(self.options.comparator_name.clone());
        edit.log_number = Some(state.log_number);
        edit.next_file_number = Some(self.next_file_number.load(Ordering::Acquire));
        edit.last_sequence = Some(self.last_sequence.load(Ordering::Acquire));
        for level in 0..NUM_LEVELS {
            for file in state.current.files(level) {
                edit.add_file(Level(level), Arc::clone(file));
            }
        }
        edit
    }

    /// Manual-compaction entry point (spec.md's supplemented range-compaction feature): forces
    /// the not-being-compacted files on `level` overlapping `[begin_user_key, end_user_key]`
    /// (either bound `None` for unbounded) down into `level + 1`, regardless of score. Returns
    /// `None` if nothing on `level` overlaps the range, or `level` is already the bottommost.
    /// Only leveled compaction exposes a manual entry point; universal and FIFO compact whole
    /// sorted runs and have no notion of a user-key range.
    #[must_use]
    pub fn compact_range(
        &self,
        level: u32,
        begin_user_key: Option<&[u8]>,
        end_user_key: Option<&[u8]>,
    ) -> Option<Compaction> {
        pick_manual_compaction(&self.current(), &self.options, level, begin_user_key, end_user_key)
    }
}

fn apply_column_family_tags(column_families: &mut BTreeMap<u32, String>, max_cf: &mut u32, edit: &VersionEdit) {
    if edit.add_column_family {
        let id = edit.column_family_id.unwrap_or(0);
        column_families.insert(id, edit.column_family_name.clone().unwrap_or_default());
    }
    if edit.drop_column_family {
        if let Some(id) = edit.column_family_id {
            column_families.remove(&id);
        }
    }
    if let Some(n) = edit.max_column_family {
        *max_cf = (*max_cf).max(n);
    }
}

impl<FS: Filesystem> FileNumberAllocator for VersionSet<FS> {
    fn next_file_number(&self) -> FileNumber {
        FileNumber(self.next_file_number.fetch_add(1, Ordering::AcqRel))
    }
}

impl<FS: Filesystem> EpochAllocator for VersionSet<FS> {
    fn next_epoch_number(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_metadata::{FileAttributes, FileDescriptor};
    use crate::format::EntryType;
    use crate::format::InternalKey;
    use lsmtree_vfs::MemoryFilesystem;

    fn file(num: u64) -> Arc<crate::file_metadata::FileMetaData> {
        crate::file_metadata::FileMetaData::new(
            FileDescriptor::new(FileNumber(num), 1000),
            InternalKey::new(b"a", 1, EntryType::Value),
            InternalKey::new(b"z", 1, EntryType::Value),
            1,
            1,
            FileAttributes::default(),
        )
    }

    #[test]
    fn create_then_recover_preserves_log_number_and_last_sequence() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let vset = VersionSet::create(fs.clone(), db_path, Options::default()).unwrap();

        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        edit.last_sequence = Some(100);
        vset.apply(edit).unwrap();
        let manifest_before = vset.manifest_file_number();
        drop(vset);

        let recovered = VersionSet::recover(fs, db_path, Options::default()).unwrap();
        assert_eq!(recovered.log_number(), 1);
        assert_eq!(recovered.last_sequence(), 100);
        assert_eq!(recovered.current().total_files(), 0);
        assert_eq!(recovered.manifest_file_number(), manifest_before, "MANIFEST reused, not rotated");
    }

    #[test]
    fn create_then_recover_preserves_added_files() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let vset = VersionSet::create(fs.clone(), db_path, Options::default()).unwrap();

        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        edit.last_sequence = Some(300);
        for (i, num) in [1_u64, 2, 3].into_iter().enumerate() {
            let mut f = file(num);
            let seq = 100 * (i as u64 + 1);
            Arc::get_mut(&mut f).unwrap().smallest_seqno = seq;
            Arc::get_mut(&mut f).unwrap().largest_seqno = seq;
            edit.add_file(Level(0), f);
        }
        vset.apply(edit).unwrap();
        drop(vset);

        let recovered = VersionSet::recover(fs, db_path, Options::default()).unwrap();
        assert_eq!(recovered.current().num_files(0), 3);
        assert_eq!(recovered.last_sequence(), 300);
    }

    #[test]
    fn recover_rejects_mismatched_comparator() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let mut options = Options::default();
        options.comparator_name = "rocksdb.ReverseBytewiseComparator".into();
        VersionSet::create(fs.clone(), db_path, options).unwrap();

        let default_options = Options::default();
        let result = VersionSet::recover(fs, db_path, default_options);
        assert!(matches!(result, Err(Error::Manifest(ManifestError::ComparatorMismatch { .. }))));
    }

    #[test]
    fn apply_allocates_monotonically_increasing_file_numbers() {
        let fs = MemoryFilesystem::new();
        let vset = VersionSet::create(fs, Path::new("/db"), Options::default()).unwrap();
        let a = vset.next_file_number();
        let b = vset.next_file_number();
        assert!(b.0 > a.0);
    }

    #[test]
    fn next_epoch_number_is_monotonic_and_survives_recovery() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let vset = VersionSet::create(fs.clone(), db_path, Options::default()).unwrap();
        let a = vset.next_epoch_number();
        let b = vset.next_epoch_number();
        assert!(b > a);

        let mut f = file(1);
        Arc::get_mut(&mut f).unwrap().attributes.epoch_number = Some(b + 5);
        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        edit.last_sequence = Some(1);
        edit.add_file(Level(0), f);
        vset.apply(edit).unwrap();
        drop(vset);

        let recovered = VersionSet::recover(fs, db_path, Options::default()).unwrap();
        assert!(recovered.next_epoch_number() > b + 5, "epoch counter must resume past the highest recovered epoch");
    }

    #[test]
    fn compact_range_targets_only_the_requested_range() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let vset = VersionSet::create(fs, db_path, Options::default()).unwrap();

        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        edit.last_sequence = Some(1);
        edit.add_file(Level(1), file(1));
        vset.apply(edit).unwrap();

        let c = vset.compact_range(1, Some(b"a"), Some(b"z")).expect("file overlaps the full range");
        assert_eq!(c.reason, crate::compaction::CompactionReason::ManualCompaction);
        assert!(vset.compact_range(1, Some(b"q"), Some(b"r")).is_none(), "no file overlaps a disjoint range");
    }

    #[test]
    fn manifest_rotates_when_size_threshold_exceeded() {
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        let mut options = Options::default();
        options.max_manifest_file_size = 1;
        let vset = VersionSet::create(fs, db_path, options).unwrap();
        let first_manifest = vset.manifest_file_number();

        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        edit.last_sequence = Some(1);
        vset.apply(edit).unwrap();

        assert!(vset.manifest_file_number().0 > first_manifest.0, "tiny threshold forces rotation");
    }
}
