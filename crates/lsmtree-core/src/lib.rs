//! Versioning, MANIFEST durability, and compaction core of an LSM storage engine: `Version`,
//! `VersionEdit`, `VersionSet`/MANIFEST (spec.md §3–§4.4), the compaction pickers, job, and
//! subcompaction executor (spec.md §4.5–§4.8). Does not implement an on-disk SST block format, a
//! memtable, or a write path — those are supplied by a host embedding this crate against the
//! `lsmtree-vfs`/`lsmtree-table` trait surfaces (spec.md §1, §6).

pub mod compaction;
pub mod config;
pub mod error;
pub mod file_metadata;
pub mod format;
pub mod level;
pub mod manifest;
pub mod version;
pub mod version_set;
pub mod write_log;

pub use config::Options;
pub use error::Error;
pub use file_metadata::{FileAttributes, FileDescriptor, FileMetaData, LeveledFile};
pub use format::{EntryType, FileNumber, InternalKey, UserKey};
pub use level::Level;
pub use version::Version;
pub use version::edit::VersionEdit;
pub use version_set::VersionSet;
