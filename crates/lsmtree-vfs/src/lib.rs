//! The filesystem surface that `lsmtree-core` requires from its host, per the "VFS surface
//! required from host" section of the core's specification: create/open a file, read/write/sync
//! it, remove/rename paths, sync a directory, and check existence or size.
//!
//! This crate does not implement a real on-disk filesystem; `lsmtree-core`'s own tests link
//! against [`memory::MemoryFilesystem`] instead. A host embedding the core against `std::fs`
//! would implement [`Filesystem`] directly over [`std::fs`].

mod memory;

use std::fmt::Debug;
use std::io::{Read, Result as IoResult, Write};
use std::path::Path;

pub use memory::MemoryFilesystem;

/// A file opened for sequential reading.
pub trait ReadableFile: Read + Debug {}
impl<T: Read + Debug> ReadableFile for T {}

/// A file opened for sequential, append-only writing.
///
/// Mirrors the `WritableFile` contract used throughout the teacher's VFS crate: writes always
/// land at the current end of the file, and durability is only promised after [`Self::sync`].
pub trait WritableFile: Write + Debug {
    /// Flushes any buffered data and asks the OS to persist it to stable storage.
    ///
    /// For the MANIFEST and WAL writers, this is the point at which a previously `add_record`ed
    /// entry becomes crash-safe.
    fn sync(&mut self) -> IoResult<()>;

    /// Persists only the file's data, not necessarily its metadata. Most implementations can
    /// alias this to [`Self::sync`]; the distinction exists because POSIX `fdatasync` can be
    /// cheaper than `fsync` when the file's size has not changed.
    fn sync_data(&mut self) -> IoResult<()> {
        self.sync()
    }

    /// The file's current length in bytes.
    fn size(&self) -> IoResult<u64>;
}

/// A directory handle that can be synced so that directory-entry changes (file creation,
/// deletion, rename) are durable.
///
/// Per spec.md §5, a new SST's directory entry must be durable before any MANIFEST edit naming
/// it is durable, and CURRENT's rename must be followed by a directory sync before `apply`
/// returns success.
pub trait SyncableDir: Debug {
    fn sync(&mut self) -> IoResult<()>;
}

/// The minimal set of filesystem primitives `lsmtree-core` needs from its host, per spec.md §6.
pub trait Filesystem: Debug {
    type ReadFile: ReadableFile;
    type WriteFile: WritableFile;
    type Dir: SyncableDir;

    /// Opens a file for sequential reading. Fails if the file does not exist.
    fn open(&self, path: &Path) -> IoResult<Self::ReadFile>;

    /// Creates (or truncates) a file for sequential, append-style writing.
    fn create(&self, path: &Path) -> IoResult<Self::WriteFile>;

    /// Opens an existing file for appending; does not truncate.
    fn open_append(&self, path: &Path) -> IoResult<Self::WriteFile>;

    fn remove(&self, path: &Path) -> IoResult<()>;

    /// Renames `src` to `dst`, replacing `dst` if it already exists (POSIX semantics, as used by
    /// the CURRENT-file commit point).
    fn rename(&self, src: &Path, dst: &Path) -> IoResult<()>;

    fn exists(&self, path: &Path) -> IoResult<bool>;

    /// Size of the file at `path`, in bytes.
    fn stat(&self, path: &Path) -> IoResult<u64>;

    /// Opens the directory containing `path` (or `path` itself, if it names a directory) so that
    /// it can be fsynced after a rename or file creation within it.
    fn open_dir(&self, path: &Path) -> IoResult<Self::Dir>;
}
