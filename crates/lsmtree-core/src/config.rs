//! Per-column-family tunables (spec.md §4.6). Where the teacher hardcodes these as
//! `config_constants`, RocksDB (and this crate) exposes them as runtime options, since multiple
//! column families with different compaction policies must coexist.

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStyle {
    Leveled,
    Universal,
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniversalStopStyle {
    TotalSize,
    SimilarSize,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub comparator_name: String,
    pub compaction_style: CompactionStyle,
    pub max_manifest_file_size: u64,

    // Leveled
    pub l0_compaction_trigger: u32,
    pub l0_stop_writes_trigger: u32,
    pub max_bytes_for_level_base: u64,
    pub max_bytes_for_level_multiplier: f64,
    pub target_file_size_base: u64,
    pub target_file_size_multiplier: f64,

    // Universal
    pub universal_size_ratio: u32,
    pub universal_min_merge_width: usize,
    pub universal_max_merge_width: usize,
    pub universal_max_size_amplification_percent: u32,
    pub universal_stop_style: UniversalStopStyle,
    pub universal_allow_trivial_move: bool,

    // FIFO
    pub fifo_max_table_files_size: u64,
    pub fifo_ttl_seconds: u64,
    pub fifo_allow_compaction: bool,

    // Compaction job
    pub max_output_file_size: u64,
    pub persist_user_defined_timestamps: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator_name: String::new(),
            compaction_style: CompactionStyle::Leveled,
            max_manifest_file_size: 64 * MIB,

            l0_compaction_trigger: 4,
            l0_stop_writes_trigger: 20,
            max_bytes_for_level_base: 256 * MIB,
            max_bytes_for_level_multiplier: 10.0,
            target_file_size_base: 64 * MIB,
            target_file_size_multiplier: 1.0,

            universal_size_ratio: 1,
            universal_min_merge_width: 2,
            universal_max_merge_width: usize::MAX,
            universal_max_size_amplification_percent: 200,
            universal_stop_style: UniversalStopStyle::TotalSize,
            universal_allow_trivial_move: false,

            fifo_max_table_files_size: GIB,
            fifo_ttl_seconds: 0,
            fifo_allow_compaction: false,

            max_output_file_size: 64 * MIB,
            persist_user_defined_timestamps: true,
        }
    }
}

impl Options {
    /// `target_size(L) = base * multiplier^(L-1)` for `L >= 1` (spec.md §4.6.1).
    #[must_use]
    pub fn target_file_size_for_level(&self, level: u32) -> u64 {
        if level == 0 {
            self.target_file_size_base
        } else {
            #[expect(clippy::cast_precision_loss, reason = "level count is tiny")]
            let scaled = self.target_file_size_base as f64
                * self.target_file_size_multiplier.powi(level as i32 - 1);
            scaled as u64
        }
    }

    #[must_use]
    pub fn max_bytes_for_level(&self, level: u32) -> u64 {
        if level == 0 {
            self.max_bytes_for_level_base
        } else {
            #[expect(clippy::cast_precision_loss, reason = "level count is tiny")]
            let scaled = self.max_bytes_for_level_base as f64
                * self.max_bytes_for_level_multiplier.powi(level as i32 - 1);
            scaled as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_target_sizes_scale_geometrically() {
        let opts = Options::default();
        assert_eq!(opts.max_bytes_for_level(1), 256 * MIB);
        assert_eq!(opts.max_bytes_for_level(2), 2_560 * MIB);
    }
}
