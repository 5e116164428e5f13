//! Framed record writer for the MANIFEST, grounded on the teacher's
//! `write_log::writer::WriteLogWriter`: same block accounting and checksum-per-type caching,
//! generalized to any [`lsmtree_vfs::WritableFile`].

use std::io::Error as IoError;

use lsmtree_vfs::WritableFile;

use super::{mask_checksum, RecordType, BLOCK_SIZE, HEADER_SIZE};

pub struct FramedWriter<W> {
    file: W,
    type_checksums: [u32; 5],
    remaining_space: usize,
}

impl<W: WritableFile> FramedWriter<W> {
    #[must_use]
    pub fn new(file: W) -> Self {
        let type_checksums = [RecordType::Zero, RecordType::Full, RecordType::First, RecordType::Middle, RecordType::Last]
            .map(|ty| crc32c::crc32c(&[u8::from(ty)]));
        Self { file, type_checksums, remaining_space: BLOCK_SIZE }
    }

    pub fn sync(&mut self) -> Result<(), IoError> {
        self.file.sync()
    }

    pub fn into_inner(self) -> W {
        self.file
    }

    /// Appends one logical record, splitting into `Full`/`First`/`Middle`/`Last` physical
    /// fragments as needed (spec.md §6). Does not itself sync; callers control fsync timing per
    /// the durability protocol in spec.md §4.4.
    pub fn add_record(&mut self, mut record: &[u8]) -> Result<(), IoError> {
        let mut first_physical = true;
        let zero_trailer = [0_u8; HEADER_SIZE - 1];

        while !record.is_empty() || first_physical {
            if let Some(trailer) = zero_trailer.get(..self.remaining_space) {
                self.file.write_all(trailer)?;
                self.remaining_space = BLOCK_SIZE;
            }

            let fragment_len = record.len().min(self.remaining_space - HEADER_SIZE);
            let last_physical = fragment_len == record.len();
            let record_type = match (first_physical, last_physical) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, false) => RecordType::Middle,
                (false, true) => RecordType::Last,
            };

            let (fragment, rest) = record.split_at(fragment_len);
            let checksum = crc32c::crc32c_append(self.checksum_for_type(record_type), fragment);
            let masked = mask_checksum(checksum);
            let len_u16 = u16::try_from(fragment_len).expect("fragment fits within one block");

            self.file.write_all(&masked.to_le_bytes())?;
            self.file.write_all(&len_u16.to_le_bytes())?;
            self.file.write_all(&[u8::from(record_type)])?;
            self.file.write_all(fragment)?;

            record = rest;
            first_physical = false;
            self.remaining_space -= HEADER_SIZE + fragment_len;
        }

        Ok(())
    }

    fn checksum_for_type(&self, ty: RecordType) -> u32 {
        self.type_checksums[usize::from(u8::from(ty))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsmtree_vfs::{Filesystem, MemoryFilesystem};
    use std::path::Path;

    #[test]
    fn single_small_record_round_trips_through_the_reader() {
        let fs = MemoryFilesystem::new();
        let path = Path::new("/db/MANIFEST-000001");
        let file = fs.create(path).unwrap();
        let mut writer = FramedWriter::new(file);
        writer.add_record(b"hello").unwrap();
        writer.sync().unwrap();
        drop(writer);

        let read_file = fs.open(path).unwrap();
        let mut reader = super::super::reader::StrictFramedReader::new(read_file);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record, b"hello");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn record_spanning_multiple_blocks_round_trips() {
        let fs = MemoryFilesystem::new();
        let path = Path::new("/db/MANIFEST-000002");
        let big = vec![0x42_u8; BLOCK_SIZE * 2 + 500];
        let mut writer = FramedWriter::new(fs.create(path).unwrap());
        writer.add_record(&big).unwrap();
        writer.add_record(b"trailer record").unwrap();
        writer.sync().unwrap();
        drop(writer);

        let mut reader = super::super::reader::StrictFramedReader::new(fs.open(path).unwrap());
        assert_eq!(reader.next_record().unwrap().unwrap(), big);
        assert_eq!(reader.next_record().unwrap().unwrap(), b"trailer record");
        assert!(reader.next_record().unwrap().is_none());
    }
}
