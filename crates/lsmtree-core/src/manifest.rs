//! `CURRENT` file helpers (spec.md §6): a one-line ASCII pointer naming the active MANIFEST,
//! whose atomic rename is the DB's commit point. Grounded on the durability-ordering steps the
//! teacher performs around its database's open/recover path, generalized into free functions
//! `lsmtree_core::version_set::VersionSet` composes.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use lsmtree_vfs::{Filesystem, WritableFile as _};

use crate::error::{Error, ManifestError};
use crate::format::FileNumber;

#[must_use]
pub fn current_path(db_path: &Path) -> PathBuf {
    db_path.join("CURRENT")
}

#[must_use]
pub fn current_tmp_path(db_path: &Path) -> PathBuf {
    db_path.join("CURRENT.tmp")
}

#[must_use]
pub fn manifest_path(db_path: &Path, manifest_number: FileNumber) -> PathBuf {
    db_path.join(manifest_number.manifest_filename())
}

#[must_use]
pub fn sst_path(db_path: &Path, file_number: FileNumber) -> PathBuf {
    db_path.join(file_number.sst_filename())
}

/// Parses a `CURRENT` file's contents (`"MANIFEST-NNNNNN\n"`) into the MANIFEST file number
/// (spec.md §4.4 step 1 of `Recover`).
pub fn parse_current_contents(contents: &str) -> Result<FileNumber, ManifestError> {
    let trimmed = contents.strip_suffix('\n').unwrap_or(contents);
    let digits = trimmed
        .strip_prefix("MANIFEST-")
        .ok_or(ManifestError::NoCurrentManifest)?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ManifestError::NoCurrentManifest);
    }
    let number: u64 = digits.parse().map_err(|_| ManifestError::NoCurrentManifest)?;
    Ok(FileNumber(number))
}

/// Writes `CURRENT` atomically: write `CURRENT.tmp`, fsync it, rename over `CURRENT`, then sync
/// the containing directory (spec.md §4.4's ordering guarantee: MANIFEST fsync completes before
/// CURRENT is advanced, and the directory sync makes the rename itself durable).
pub fn write_current<FS: Filesystem>(
    fs: &FS,
    db_path: &Path,
    manifest_number: FileNumber,
) -> Result<(), Error> {
    let tmp = current_tmp_path(db_path);
    let dst = current_path(db_path);

    let mut file = fs.create(&tmp).map_err(|e| Error::io("create CURRENT.tmp", e))?;
    file.write_all(format!("{}\n", manifest_number.manifest_filename()).as_bytes())
        .map_err(|e| Error::io("write CURRENT.tmp", e))?;
    file.sync().map_err(|e| Error::io("sync CURRENT.tmp", e))?;
    drop(file);

    fs.rename(&tmp, &dst).map_err(|e| Error::io("rename CURRENT.tmp to CURRENT", e))?;

    let mut dir = fs.open_dir(db_path).map_err(|e| Error::io("open db directory", e))?;
    lsmtree_vfs::SyncableDir::sync(&mut dir).map_err(|e| Error::io("sync db directory", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_current_contents() {
        assert_eq!(parse_current_contents("MANIFEST-000123\n").unwrap(), FileNumber(123));
    }

    #[test]
    fn rejects_malformed_current_contents() {
        assert!(parse_current_contents("garbage\n").is_err());
        assert!(parse_current_contents("MANIFEST-12\n").is_err());
    }

    #[test]
    fn write_current_round_trips_through_memory_filesystem() {
        use lsmtree_vfs::MemoryFilesystem;
        let fs = MemoryFilesystem::new();
        let db_path = Path::new("/db");
        write_current(&fs, db_path, FileNumber(5)).unwrap();

        let mut contents = String::new();
        use std::io::Read as _;
        fs.open(&current_path(db_path)).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(parse_current_contents(&contents).unwrap(), FileNumber(5));
    }
}
