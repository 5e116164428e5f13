//! Compaction pickers (spec.md §4.6): leveled, universal (size-tiered), and FIFO. All three
//! satisfy the same contract — skip files already `being_compacted`, never double-select a file
//! across concurrent picks — dispatched through one sum type per spec.md §9's "polymorphic
//! pickers" redesign note, rather than a trait object, since the set of policies is closed.

pub mod fifo;
pub mod leveled;
pub mod universal;

use crate::compaction::descriptor::Compaction;
use crate::config::{CompactionStyle, Options};
use crate::version::Version;

#[derive(Debug, Clone, Copy)]
pub enum Picker {
    Leveled,
    Universal,
    Fifo,
}

impl Picker {
    #[must_use]
    pub fn for_style(style: CompactionStyle) -> Self {
        match style {
            CompactionStyle::Leveled => Self::Leveled,
            CompactionStyle::Universal => Self::Universal,
            CompactionStyle::Fifo => Self::Fifo,
        }
    }

    #[must_use]
    pub fn needs_compaction(self, version: &Version, opts: &Options) -> bool {
        match self {
            Self::Leveled => leveled::needs_compaction(version, opts),
            Self::Universal => universal::needs_compaction(version, opts),
            Self::Fifo => fifo::needs_compaction(version, opts),
        }
    }

    #[must_use]
    pub fn pick_compaction(self, version: &Version, opts: &Options) -> Option<Compaction> {
        match self {
            Self::Leveled => leveled::pick_compaction(version, opts),
            Self::Universal => universal::pick_compaction(version, opts),
            Self::Fifo => fifo::pick_compaction(version, opts),
        }
    }
}
