//! Leveled compaction (spec.md §4.6.1): the classic LevelDB/RocksDB policy. L0→L1 is prioritized
//! over any other level; otherwise the level with the highest score is chosen, its largest
//! not-being-compacted file is picked, and the selection is expanded into the next level via
//! `overlapping_inputs`.

use crate::compaction::descriptor::{Compaction, CompactionReason};
use crate::config::Options;
use crate::file_metadata::LeveledFile;
use crate::format::{EntryType, InternalKey};
use crate::level::{Level, NUM_LEVELS};
use crate::version::Version;

#[must_use]
pub fn l0_score(version: &Version, opts: &Options) -> f64 {
    f64::from(u32::try_from(version.num_files(0)).unwrap_or(u32::MAX)) / f64::from(opts.l0_compaction_trigger)
}

#[must_use]
pub fn level_score(version: &Version, opts: &Options, level: u32) -> f64 {
    if level == 0 {
        return l0_score(version, opts);
    }
    #[expect(clippy::cast_precision_loss, reason = "level byte totals fit comfortably in f64")]
    let bytes = version.num_level_bytes(level) as f64;
    #[expect(clippy::cast_precision_loss, reason = "target sizes fit comfortably in f64")]
    let target = opts.max_bytes_for_level(level) as f64;
    bytes / target
}

#[must_use]
pub fn needs_compaction(version: &Version, opts: &Options) -> bool {
    if version.num_files(0) as u32 >= opts.l0_compaction_trigger {
        return true;
    }
    (1..NUM_LEVELS - 1).any(|level| level_score(version, opts, level) >= 1.0)
}

#[must_use]
pub fn pick_compaction(version: &Version, opts: &Options) -> Option<Compaction> {
    if version.num_files(0) as u32 >= opts.l0_compaction_trigger {
        return pick_l0_compaction(version, opts);
    }

    let (best_level, best_score) = (1..NUM_LEVELS - 1)
        .map(|level| (level, level_score(version, opts, level)))
        .filter(|&(_, score)| score >= 1.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    pick_level_compaction(version, opts, best_level, best_score)
}

fn pick_l0_compaction(version: &Version, opts: &Options) -> Option<Compaction> {
    let l0_files: Vec<_> = version.files(0).iter().filter(|f| !f.being_compacted()).cloned().collect();
    if l0_files.is_empty() {
        return None;
    }

    let smallest = l0_files.iter().map(|f| f.smallest_key()).min().expect("non-empty");
    let largest = l0_files.iter().map(|f| f.largest_key()).max().expect("non-empty");

    let l1_files = version
        .overlapping_inputs(1, Some(smallest), Some(largest))
        .into_iter()
        .filter(|f| !f.being_compacted());

    let mut inputs: Vec<LeveledFile> =
        l0_files.into_iter().map(|file| LeveledFile { level: Level(0), file }).collect();
    inputs.extend(l1_files.map(|file| LeveledFile { level: Level(1), file }));

    let score = l0_score(version, opts);
    let max_output_file_size = opts.target_file_size_for_level(1);
    Some(Compaction::new(inputs, 1, max_output_file_size, score, CompactionReason::LevelL0FileNumTrigger))
}

fn pick_level_compaction(version: &Version, opts: &Options, level: u32, score: f64) -> Option<Compaction> {
    let candidate = version
        .files(level)
        .iter()
        .filter(|f| !f.being_compacted())
        .max_by_key(|f| f.file_size())?
        .clone();

    let next_level = level + 1;
    let overlapping = version
        .overlapping_inputs(next_level, Some(candidate.smallest_key()), Some(candidate.largest_key()))
        .into_iter()
        .filter(|f| !f.being_compacted());

    let mut inputs = vec![LeveledFile { level: Level(level), file: candidate }];
    inputs.extend(overlapping.map(|file| LeveledFile { level: Level(next_level), file }));

    let is_trivial_move = inputs.len() == 1;
    let max_output_file_size = opts.target_file_size_for_level(next_level);
    let mut compaction =
        Compaction::new(inputs, next_level as i32, max_output_file_size, score, CompactionReason::LevelMaxLevelSize);
    compaction.is_trivial_move = is_trivial_move;
    Some(compaction)
}

/// Forces all not-being-compacted files on `level` overlapping `[begin_user_key, end_user_key]`
/// (either bound `None` for unbounded) into `level + 1`, regardless of score — the manual
/// compaction entry point. Expansion into the next level follows the same
/// `overlapping_inputs`-based rule `pick_level_compaction` uses; only the input selection at
/// `level` itself differs (caller-supplied range instead of the largest-file heuristic).
#[must_use]
pub fn pick_manual_compaction(
    version: &Version,
    opts: &Options,
    level: u32,
    begin_user_key: Option<&[u8]>,
    end_user_key: Option<&[u8]>,
) -> Option<Compaction> {
    if level + 1 >= NUM_LEVELS {
        return None;
    }

    let begin = begin_user_key.map(|k| InternalKey::new(k, u64::MAX, EntryType::Value));
    let end = end_user_key.map(|k| InternalKey::new(k, 0, EntryType::Value));

    let inputs_at_level: Vec<_> = version
        .overlapping_inputs(level, begin.as_ref().map(InternalKey::as_ref), end.as_ref().map(InternalKey::as_ref))
        .into_iter()
        .filter(|f| !f.being_compacted())
        .collect();
    if inputs_at_level.is_empty() {
        return None;
    }

    let smallest = inputs_at_level.iter().map(|f| f.smallest_key()).min().expect("non-empty");
    let largest = inputs_at_level.iter().map(|f| f.largest_key()).max().expect("non-empty");

    let next_level = level + 1;
    let overlapping = version
        .overlapping_inputs(next_level, Some(smallest), Some(largest))
        .into_iter()
        .filter(|f| !f.being_compacted());

    let mut inputs: Vec<LeveledFile> =
        inputs_at_level.into_iter().map(|file| LeveledFile { level: Level(level), file }).collect();
    inputs.extend(overlapping.map(|file| LeveledFile { level: Level(next_level), file }));

    let is_trivial_move = inputs.len() == 1;
    let max_output_file_size = opts.target_file_size_for_level(next_level);
    let mut compaction =
        Compaction::new(inputs, next_level as i32, max_output_file_size, 0.0, CompactionReason::ManualCompaction);
    compaction.is_trivial_move = is_trivial_move;
    Some(compaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_metadata::{FileAttributes, FileDescriptor, FileMetaData};
    use crate::format::{EntryType, FileNumber, InternalKey};

    fn file(num: u64, smallest: &[u8], largest: &[u8], size: u64) -> std::sync::Arc<FileMetaData> {
        FileMetaData::new(
            FileDescriptor::new(FileNumber(num), size),
            InternalKey::new(smallest, 1, EntryType::Value),
            InternalKey::new(largest, 1, EntryType::Value),
            1,
            1,
            FileAttributes::default(),
        )
    }

    #[test]
    fn l0_trigger_pick_selects_all_l0_files() {
        let mut v = Version::empty();
        for i in 1..=4 {
            v.files_mut(0).push(file(i, b"a", b"z", 1000));
        }
        let opts = Options { l0_compaction_trigger: 4, ..Options::default() };
        assert!(needs_compaction(&v, &opts));

        let c = pick_compaction(&v, &opts).expect("a compaction should be picked");
        assert_eq!(c.start_level(), 0);
        assert_eq!(c.output_level, 1);
        assert_eq!(c.num_input_files(), 4);
        assert_eq!(c.reason, CompactionReason::LevelL0FileNumTrigger);
    }

    #[test]
    fn files_being_compacted_are_excluded() {
        let mut v = Version::empty();
        for i in 1..=4 {
            v.files_mut(0).push(file(i, b"a", b"z", 1000));
        }
        v.files(0)[0].set_being_compacted(true);
        let opts = Options { l0_compaction_trigger: 4, ..Options::default() };
        let c = pick_compaction(&v, &opts).unwrap();
        assert_eq!(c.num_input_files(), 3);
    }

    #[test]
    fn below_trigger_and_below_score_yields_no_compaction() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, b"a", b"z", 1000));
        let opts = Options::default();
        assert!(!needs_compaction(&v, &opts));
        assert!(pick_compaction(&v, &opts).is_none());
    }

    #[test]
    fn manual_compaction_targets_only_the_requested_range() {
        let mut v = Version::empty();
        v.files_mut(1).extend([file(1, b"a", b"c", 1000), file(2, b"m", b"p", 1000)]);
        let opts = Options::default();

        let c = pick_manual_compaction(&v, &opts, 1, Some(b"m"), Some(b"p")).expect("range overlaps file 2");
        assert_eq!(c.num_input_files(), 1);
        assert_eq!(c.output_level, 2);
        assert_eq!(c.reason, CompactionReason::ManualCompaction);

        assert!(pick_manual_compaction(&v, &opts, 1, Some(b"x"), Some(b"z")).is_none());
    }

    #[test]
    fn manual_compaction_on_the_bottommost_level_is_a_no_op() {
        let mut v = Version::empty();
        v.files_mut(NUM_LEVELS - 1).push(file(1, b"a", b"z", 1000));
        let opts = Options::default();
        assert!(pick_manual_compaction(&v, &opts, NUM_LEVELS - 1, None, None).is_none());
    }
}
