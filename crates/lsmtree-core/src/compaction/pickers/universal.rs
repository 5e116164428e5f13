//! Universal (size-tiered) compaction (spec.md §4.6.2). Each L0 file is its own "sorted run";
//! each L≥1 is one run. Size-amplification picks everything once old data dominates; otherwise a
//! sliding size-ratio window picks a contiguous run of similarly-sized runs.

use crate::compaction::descriptor::{Compaction, CompactionReason};
use crate::config::Options;
use crate::file_metadata::LeveledFile;
use crate::level::{Level, NUM_LEVELS};
use crate::version::Version;

struct Run {
    level: Level,
    files: Vec<std::sync::Arc<crate::file_metadata::FileMetaData>>,
}

impl Run {
    fn size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size()).sum()
    }
}

/// Builds sorted runs newest-first: each L0 file is its own run (sorted by `largest_seqno`
/// descending), then each non-empty L≥1 is one run. A level whose any file is `being_compacted`
/// is skipped entirely (spec.md §4.6.2).
fn build_runs(version: &Version) -> Vec<Run> {
    let mut runs = Vec::new();

    let mut l0: Vec<_> = version.files(0).to_vec();
    if l0.iter().any(|f| f.being_compacted()) {
        return runs;
    }
    l0.sort_by_key(|f| std::cmp::Reverse(f.largest_seqno));
    for f in l0 {
        runs.push(Run { level: Level(0), files: vec![f] });
    }

    for level in 1..NUM_LEVELS {
        let files = version.files(level);
        if files.is_empty() || files.iter().any(|f| f.being_compacted()) {
            continue;
        }
        runs.push(Run { level: Level(level), files: files.to_vec() });
    }

    runs
}

#[must_use]
pub fn needs_compaction(version: &Version, opts: &Options) -> bool {
    pick_compaction(version, opts).is_some()
}

#[must_use]
pub fn pick_compaction(version: &Version, opts: &Options) -> Option<Compaction> {
    let runs = build_runs(version);
    if runs.len() < 2 {
        return None;
    }

    if let Some(c) = pick_size_amplification(&runs, opts) {
        return Some(c);
    }
    pick_size_ratio(&runs, opts)
}

fn pick_size_amplification(runs: &[Run], opts: &Options) -> Option<Compaction> {
    let newest = runs.first()?;
    let older_total: u64 = runs[1..].iter().map(Run::size).sum();
    let newest_size = newest.size().max(1);
    let amp = older_total * 100 / newest_size;
    if amp <= u64::from(opts.universal_max_size_amplification_percent) {
        return None;
    }

    let inputs = flatten(runs);
    let output_level = runs.iter().map(|r| r.level.0).max().unwrap_or(1).max(1);
    let mut c = Compaction::new(
        inputs,
        output_level as i32,
        opts.target_file_size_for_level(output_level),
        f64::from(u32::try_from(amp).unwrap_or(u32::MAX)),
        CompactionReason::UniversalSizeAmplification,
    );
    c.is_deletion_compaction = false;
    Some(c)
}

fn pick_size_ratio(runs: &[Run], opts: &Options) -> Option<Compaction> {
    for start in 0..runs.len() {
        let mut end = start + 1;
        while end < runs.len() && end - start < opts.universal_max_merge_width {
            let prev_size = runs[end - 1].size().max(1);
            let curr_size = runs[end].size().max(1);
            if prev_size * 100 / curr_size > 100 + u64::from(opts.universal_size_ratio) {
                break;
            }
            end += 1;
        }

        let window_len = end - start;
        if window_len >= opts.universal_min_merge_width {
            let window = &runs[start..end];
            let inputs = flatten(window);
            let output_level = window.iter().map(|r| r.level.0).max().unwrap_or(1).max(1);
            return Some(Compaction::new(
                inputs,
                output_level as i32,
                opts.target_file_size_for_level(output_level),
                1.0,
                CompactionReason::UniversalSizeRatio,
            ));
        }
    }
    None
}

fn flatten(runs: &[Run]) -> Vec<LeveledFile> {
    runs.iter()
        .flat_map(|run| run.files.iter().map(move |f| LeveledFile { level: run.level, file: f.clone() }))
        .collect()
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
    fn size_amplification_triggers_full_compaction() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, 1000, 2)); // newest, small
        v.files_mut(0).push(file(2, 5000, 1)); // older, large
        let opts = Options { universal_max_size_amplification_percent: 200, ..Options::default() };

        let c = pick_compaction(&v, &opts).expect("amplification should trigger");
        assert_eq!(c.reason, CompactionReason::UniversalSizeAmplification);
        assert_eq!(c.num_input_files(), 2);
    }

    #[test]
    fn similarly_sized_runs_are_picked_by_size_ratio() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, 1000, 3));
        v.files_mut(0).push(file(2, 1000, 2));
        v.files_mut(0).push(file(3, 1000, 1));
        let opts = Options { universal_max_size_amplification_percent: 100_000, ..Options::default() };

        let c = pick_compaction(&v, &opts).expect("ratio window should trigger");
        assert_eq!(c.reason, CompactionReason::UniversalSizeRatio);
    }

    #[test]
    fn single_run_never_triggers() {
        let mut v = Version::empty();
        v.files_mut(0).push(file(1, 1000, 1));
        let opts = Options::default();
        assert!(!needs_compaction(&v, &opts));
    }
}
