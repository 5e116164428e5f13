//! Compaction: descriptor, pickers (spec.md §4.6), job execution (spec.md §4.7), and parallel
//! subcompaction (spec.md §4.8).

pub mod descriptor;
pub mod job;
pub mod operators;
pub mod pickers;
pub mod subcompaction;

pub use descriptor::{Compaction, CompactionReason};
pub use operators::{CompactionFilter, FileNumberAllocator, FilterDecision, MergeOperator, RateLimiter};
