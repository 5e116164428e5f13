//! Error taxonomy for this crate (spec.md §7): one `thiserror` enum per subsystem, composed into
//! the crate-wide [`Error`] via `#[from]`, mirroring how the teacher composes `LogReadError` out
//! of framing failures.

use std::io;

use lsmtree_table::TableError;

/// Top-level error returned by every public entry point in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Compaction(#[from] CompactionError),

    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Failures decoding/encoding a [`crate::version::edit::VersionEdit`] (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input while decoding a version edit")]
    UnexpectedEndOfInput,

    #[error("invalid tag {0} in version edit")]
    InvalidTag(u64),

    #[error("tag {0} is required but not recognized by this build")]
    UnknownRequiredTag(u64),

    #[error("invalid file metadata: {0}")]
    InvalidFileMetadata(String),
}

/// Failures reading the MANIFEST's framed record stream (spec.md §6). Only ever produced by the
/// STRICT reader; the crate does not expose a lenient one.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("checksum mismatch in record at byte offset {offset}")]
    ChecksumMismatch { offset: u64 },

    #[error("fragment truncated at byte offset {offset}")]
    TruncatedFragment { offset: u64 },

    #[error("unexpected record type sequence at byte offset {offset}: {detail}")]
    UnexpectedRecordType { offset: u64, detail: &'static str },
}

/// Failures in MANIFEST lifecycle management (spec.md §4.4).
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no CURRENT file, or it does not name a well-formed MANIFEST")]
    NoCurrentManifest,

    #[error("MANIFEST replay produced an invalid state: {0}")]
    InvalidManifest(String),

    #[error("comparator mismatch: database uses {configured:?}, MANIFEST records {recorded:?}")]
    ComparatorMismatch { configured: String, recorded: String },

    #[error("MANIFEST exceeded the configured maximum size of {limit} bytes")]
    ManifestTooLarge { limit: u64 },
}

/// Failures during compaction job execution (spec.md §4.7).
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("input file {0} referenced by the compaction is missing from the table cache")]
    InputFileMissing(u64),

    #[error("merge operator failed on user key {user_key:?}: {reason}")]
    MergeOperatorFailed { user_key: Vec<u8>, reason: String },

    #[error(transparent)]
    Table(#[from] TableError),
}
