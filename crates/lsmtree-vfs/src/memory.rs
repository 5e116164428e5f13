//! A small in-memory [`Filesystem`], used by `lsmtree-core`'s own test suite in place of a real
//! disk. Grounded on the shape of the teacher's `anchored-vfs::memory_fs`, simplified to a flat
//! path-keyed map since the core's tests only ever address paths within a single database
//! directory.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{Filesystem, SyncableDir};

#[derive(Debug, Default, Clone)]
struct FileData {
    bytes: Vec<u8>,
    /// Bumped on every `sync`/`sync_data` call; lets tests assert that a sync actually occurred
    /// before a dependent operation.
    sync_count: u64,
}

/// An in-memory filesystem shared by clone; every clone observes the same files.
#[derive(Clone)]
pub struct MemoryFilesystem {
    files: Arc<Mutex<HashMap<PathBuf, FileData>>>,
}

impl Debug for MemoryFilesystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let files = self.files.lock().unwrap();
        f.debug_struct("MemoryFilesystem")
            .field("file_count", &files.len())
            .finish()
    }
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFilesystem {
    #[must_use]
    pub fn new() -> Self {
        Self { files: Arc::new(Mutex::new(HashMap::new())) }
    }
}

#[derive(Debug)]
pub struct MemoryReadFile {
    data: Vec<u8>,
    pos: usize,
}

impl Read for MemoryReadFile {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Debug)]
pub struct MemoryWriteFile {
    fs: MemoryFilesystem,
    path: PathBuf,
}

impl Write for MemoryWriteFile {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let mut files = self.fs.files.lock().unwrap();
        let entry = files.entry(self.path.clone()).or_default();
        entry.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl crate::WritableFile for MemoryWriteFile {
    fn sync(&mut self) -> IoResult<()> {
        let mut files = self.fs.files.lock().unwrap();
        let entry = files.entry(self.path.clone()).or_default();
        entry.sync_count += 1;
        Ok(())
    }

    fn size(&self) -> IoResult<u64> {
        let files = self.fs.files.lock().unwrap();
        Ok(files.get(&self.path).map_or(0, |f| f.bytes.len() as u64))
    }
}

#[derive(Debug)]
pub struct MemoryDir {
    #[expect(dead_code, reason = "kept for symmetry with a real directory handle")]
    path: PathBuf,
}

impl SyncableDir for MemoryDir {
    fn sync(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Filesystem for MemoryFilesystem {
    type ReadFile = MemoryReadFile;
    type WriteFile = MemoryWriteFile;
    type Dir = MemoryDir;

    fn open(&self, path: &Path) -> IoResult<Self::ReadFile> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(path)
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("{}", path.display())))?
            .bytes
            .clone();
        Ok(MemoryReadFile { data, pos: 0 })
    }

    fn create(&self, path: &Path) -> IoResult<Self::WriteFile> {
        let mut files = self.files.lock().unwrap();
        files.insert(path.to_path_buf(), FileData::default());
        Ok(MemoryWriteFile { fs: self.clone(), path: path.to_path_buf() })
    }

    fn open_append(&self, path: &Path) -> IoResult<Self::WriteFile> {
        let mut files = self.files.lock().unwrap();
        files.entry(path.to_path_buf()).or_default();
        Ok(MemoryWriteFile { fs: self.clone(), path: path.to_path_buf() })
    }

    fn remove(&self, path: &Path) -> IoResult<()> {
        let mut files = self.files.lock().unwrap();
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("{}", path.display())))
    }

    fn rename(&self, src: &Path, dst: &Path) -> IoResult<()> {
        let mut files = self.files.lock().unwrap();
        let data = files
            .remove(src)
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("{}", src.display())))?;
        files.insert(dst.to_path_buf(), data);
        Ok(())
    }

    fn exists(&self, path: &Path) -> IoResult<bool> {
        let files = self.files.lock().unwrap();
        Ok(files.contains_key(path))
    }

    fn stat(&self, path: &Path) -> IoResult<u64> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|f| f.bytes.len() as u64)
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("{}", path.display())))
    }

    fn open_dir(&self, path: &Path) -> IoResult<Self::Dir> {
        Ok(MemoryDir { path: path.to_path_buf() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WritableFile as _;

    #[test]
    fn write_then_read_round_trips() {
        let fs = MemoryFilesystem::new();
        let path = Path::new("/db/CURRENT");
        let mut w = fs.create(path).unwrap();
        w.write_all(b"MANIFEST-000001\n").unwrap();
        w.sync().unwrap();

        let mut r = fs.open(path).unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"MANIFEST-000001\n");
    }

    #[test]
    fn rename_moves_contents() {
        let fs = MemoryFilesystem::new();
        let tmp = Path::new("/db/CURRENT.tmp");
        let dst = Path::new("/db/CURRENT");
        fs.create(tmp).unwrap().write_all(b"hello").unwrap();
        fs.rename(tmp, dst).unwrap();
        assert!(!fs.exists(tmp).unwrap());
        assert!(fs.exists(dst).unwrap());
    }

    #[test]
    fn open_missing_file_errors() {
        let fs = MemoryFilesystem::new();
        assert!(fs.open(Path::new("/nope")).is_err());
    }
}
