//! The `VersionEdit` wire format (spec.md §4.1). Tag numeric values are fixed for compatibility
//! with the RocksDB v10.7.5 encoding the spec names; unrecognized top-level tags are preserved
//! verbatim if safe-to-ignore (bit 13 set) and rejected otherwise, same discipline for `NewFile4`
//! sub-tags (bit 6 set). Grounded on the teacher's `version::version_edit::VersionEdit`, which
//! uses the same varint/length-prefixed encoding scheme but a fixed, non-extensible tag set;
//! this module generalizes it to carry arbitrary safe-to-ignore extensions explicitly as data
//! rather than assuming a closed tag set.

use std::collections::BTreeSet;

use integer_encoding::{VarInt as _, VarIntWriter as _};

use crate::error::CodecError;
use crate::file_metadata::{FileAttributes, FileDescriptor, FileMetaData};
use crate::format::{FileNumber, InternalKey};
use crate::level::Level;
use std::sync::Arc;

const TAG_COMPARATOR: u64 = 1;
const TAG_LOG_NUMBER: u64 = 2;
const TAG_NEXT_FILE_NUMBER: u64 = 3;
const TAG_LAST_SEQUENCE: u64 = 4;
const TAG_COMPACT_CURSOR: u64 = 5;
const TAG_DELETED_FILE: u64 = 6;
const TAG_PREV_LOG_NUMBER: u64 = 9;
const TAG_MIN_LOG_NUMBER_TO_KEEP: u64 = 10;
const TAG_NEW_FILE4: u64 = 103;
const TAG_COLUMN_FAMILY: u64 = 200;
const TAG_COLUMN_FAMILY_ADD: u64 = 201;
const TAG_COLUMN_FAMILY_DROP: u64 = 202;
const TAG_MAX_COLUMN_FAMILY: u64 = 203;
const TAG_IN_ATOMIC_GROUP: u64 = 300;
const TAG_FULL_HISTORY_TS_LOW: u64 = 304;
const TAG_PERSIST_USER_DEFINED_TIMESTAMPS: u64 = 305;

/// Top-level tags with bit 13 set are safe-to-ignore extensions (spec.md §4.1).
const SAFE_TO_IGNORE_BIT: u64 = 1 << 13;

const SUBTAG_TERMINATE: u64 = 1;
const SUBTAG_NEED_COMPACTION: u64 = 2;
const SUBTAG_PATH_ID: u64 = 3;
const SUBTAG_OLDEST_BLOB_FILE_NUMBER: u64 = 4;
const SUBTAG_OLDEST_ANCESTOR_TIME: u64 = 5;
const SUBTAG_FILE_CREATION_TIME: u64 = 6;
const SUBTAG_FILE_CHECKSUM: u64 = 7;
const SUBTAG_CHECKSUM_FUNC_NAME: u64 = 8;
const SUBTAG_TEMPERATURE: u64 = 9;
const SUBTAG_EPOCH_NUMBER: u64 = 13;
const SUBTAG_COMPENSATED_RANGE_DEL_SIZE: u64 = 14;
const SUBTAG_TAIL_SIZE: u64 = 15;
const SUBTAG_USER_DEFINED_TIMESTAMPS_PERSISTED: u64 = 16;

/// Sub-tags with bit 6 set are safe-to-ignore extensions.
const SUBTAG_SAFE_TO_IGNORE_BIT: u64 = 1 << 6;

/// One atomic metadata change to the file inventory (spec.md §3). Every field is presence-
/// flagged: `None`/empty means "this edit does not touch that piece of state".
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    pub comparator_name: Option<String>,
    pub column_family_id: Option<u32>,
    pub column_family_name: Option<String>,
    pub add_column_family: bool,
    pub drop_column_family: bool,
    pub max_column_family: Option<u32>,

    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub min_log_number_to_keep: Option<u64>,

    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,

    pub in_atomic_group: Option<AtomicGroupMarker>,

    pub new_files: Vec<(Level, Arc<FileMetaData>)>,
    pub deleted_files: BTreeSet<(Level, FileNumber)>,
    pub compact_cursors: Vec<(Level, InternalKey)>,

    pub full_history_ts_low: Option<Vec<u8>>,
    pub persist_user_defined_timestamps: Option<bool>,

    /// Unrecognized-but-safe-to-ignore top-level tags, preserved so re-encoding round-trips
    /// (spec.md §4.1, §9).
    pub unknown_tags: Vec<(u64, Vec<u8>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicGroupMarker {
    pub remaining_entries: u32,
}

impl VersionEdit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, level: Level, file: Arc<FileMetaData>) {
        self.new_files.push((level, file));
    }

    pub fn delete_file(&mut self, level: Level, file_number: FileNumber) {
        self.deleted_files.insert((level, file_number));
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some(name) = &self.comparator_name {
            write_tag(&mut out, TAG_COMPARATOR);
            write_len_prefixed(&mut out, name.as_bytes());
        }
        if let Some(cf) = self.column_family_id {
            write_tag(&mut out, TAG_COLUMN_FAMILY);
            write_varint(&mut out, u64::from(cf));
        }
        if self.add_column_family {
            write_tag(&mut out, TAG_COLUMN_FAMILY_ADD);
            write_len_prefixed(&mut out, self.column_family_name.as_deref().unwrap_or("").as_bytes());
        }
        if self.drop_column_family {
            write_tag(&mut out, TAG_COLUMN_FAMILY_DROP);
        }
        if let Some(max_cf) = self.max_column_family {
            write_tag(&mut out, TAG_MAX_COLUMN_FAMILY);
            write_varint(&mut out, u64::from(max_cf));
        }
        if let Some(log_number) = self.log_number {
            write_tag(&mut out, TAG_LOG_NUMBER);
            write_varint(&mut out, log_number);
        }
        if let Some(prev) = self.prev_log_number {
            write_tag(&mut out, TAG_PREV_LOG_NUMBER);
            write_varint(&mut out, prev);
        }
        if let Some(keep) = self.min_log_number_to_keep {
            write_tag(&mut out, TAG_MIN_LOG_NUMBER_TO_KEEP);
            write_varint(&mut out, keep);
        }
        if let Some(next) = self.next_file_number {
            write_tag(&mut out, TAG_NEXT_FILE_NUMBER);
            write_varint(&mut out, next);
        }
        if let Some(seq) = self.last_sequence {
            write_tag(&mut out, TAG_LAST_SEQUENCE);
            write_varint(&mut out, seq);
        }
        if let Some(group) = self.in_atomic_group {
            write_tag(&mut out, TAG_IN_ATOMIC_GROUP);
            write_varint(&mut out, u64::from(group.remaining_entries));
        }
        for (level, cursor) in &self.compact_cursors {
            write_tag(&mut out, TAG_COMPACT_CURSOR);
            write_varint(&mut out, u64::from(level.0));
            write_len_prefixed(&mut out, cursor.as_ref().0);
        }
        for (level, file) in &self.deleted_files {
            write_tag(&mut out, TAG_DELETED_FILE);
            write_varint(&mut out, u64::from(level.0));
            write_varint(&mut out, file.0);
        }
        for (level, file) in &self.new_files {
            write_tag(&mut out, TAG_NEW_FILE4);
            encode_new_file4(&mut out, *level, file);
        }
        if let Some(ts_low) = &self.full_history_ts_low {
            write_tag(&mut out, TAG_FULL_HISTORY_TS_LOW);
            write_len_prefixed(&mut out, ts_low);
        }
        if let Some(persist) = self.persist_user_defined_timestamps {
            write_tag(&mut out, TAG_PERSIST_USER_DEFINED_TIMESTAMPS);
            write_varint(&mut out, u64::from(persist));
        }
        for (tag, raw) in &self.unknown_tags {
            write_tag(&mut out, *tag);
            out.extend_from_slice(raw);
        }

        out
    }

    pub fn decode(mut input: &[u8]) -> Result<Self, CodecError> {
        let mut edit = Self::default();

        while !input.is_empty() {
            let tag = read_varint(&mut input)?;
            match tag {
                TAG_COMPARATOR => edit.comparator_name = Some(read_string(&mut input)?),
                TAG_COLUMN_FAMILY => {
                    edit.column_family_id = Some(u32::try_from(read_varint(&mut input)?).unwrap_or(u32::MAX));
                }
                TAG_COLUMN_FAMILY_ADD => {
                    edit.add_column_family = true;
                    edit.column_family_name = Some(read_string(&mut input)?);
                }
                TAG_COLUMN_FAMILY_DROP => edit.drop_column_family = true,
                TAG_MAX_COLUMN_FAMILY => {
                    edit.max_column_family = Some(u32::try_from(read_varint(&mut input)?).unwrap_or(u32::MAX));
                }
                TAG_LOG_NUMBER => edit.log_number = Some(read_varint(&mut input)?),
                TAG_PREV_LOG_NUMBER => edit.prev_log_number = Some(read_varint(&mut input)?),
                TAG_MIN_LOG_NUMBER_TO_KEEP => edit.min_log_number_to_keep = Some(read_varint(&mut input)?),
                TAG_NEXT_FILE_NUMBER => edit.next_file_number = Some(read_varint(&mut input)?),
                TAG_LAST_SEQUENCE => edit.last_sequence = Some(read_varint(&mut input)?),
                TAG_IN_ATOMIC_GROUP => {
                    let remaining = read_varint(&mut input)?;
                    edit.in_atomic_group = Some(AtomicGroupMarker {
                        remaining_entries: u32::try_from(remaining).unwrap_or(u32::MAX),
                    });
                }
                TAG_COMPACT_CURSOR => {
                    let level = read_level(&mut input)?;
                    let key = read_len_prefixed(&mut input)?.to_vec();
                    let cursor = InternalKey::from_raw(key)
                        .ok_or(CodecError::UnexpectedEndOfInput)?;
                    edit.compact_cursors.push((level, cursor));
                }
                TAG_DELETED_FILE => {
                    let level = read_level(&mut input)?;
                    let file_number = FileNumber(read_varint(&mut input)?);
                    edit.deleted_files.insert((level, file_number));
                }
                TAG_NEW_FILE4 => {
                    let (level, file) = decode_new_file4(&mut input)?;
                    edit.new_files.push((level, file));
                }
                TAG_FULL_HISTORY_TS_LOW => edit.full_history_ts_low = Some(read_len_prefixed(&mut input)?.to_vec()),
                TAG_PERSIST_USER_DEFINED_TIMESTAMPS => {
                    edit.persist_user_defined_timestamps = Some(read_varint(&mut input)? != 0);
                }
                unknown if unknown & SAFE_TO_IGNORE_BIT != 0 => {
                    let raw = read_remaining_field(&mut input)?;
                    edit.unknown_tags.push((unknown, raw));
                }
                unknown => return Err(CodecError::UnknownRequiredTag(unknown)),
            }
        }

        Ok(edit)
    }
}

fn encode_new_file4(out: &mut Vec<u8>, level: Level, file: &FileMetaData) {
    write_varint(out, u64::from(level.0));
    write_varint(out, file.file_number().0);
    write_varint(out, file.file_size());
    write_len_prefixed(out, file.smallest_key().0);
    write_len_prefixed(out, file.largest_key().0);
    write_varint(out, file.smallest_seqno);
    write_varint(out, file.largest_seqno);

    let attrs = &file.attributes;
    if file.descriptor.path_id != 0 {
        write_subtag(out, SUBTAG_PATH_ID);
        write_varint(out, u64::from(file.descriptor.path_id));
    }
    if attrs.needs_compaction {
        write_subtag(out, SUBTAG_NEED_COMPACTION);
        write_varint(out, 1);
    }
    if let Some(v) = attrs.oldest_blob_file_number {
        write_subtag(out, SUBTAG_OLDEST_BLOB_FILE_NUMBER);
        write_varint(out, v);
    }
    if let Some(v) = attrs.oldest_ancestor_time {
        write_subtag(out, SUBTAG_OLDEST_ANCESTOR_TIME);
        write_varint(out, v);
    }
    if let Some(v) = attrs.file_creation_time {
        write_subtag(out, SUBTAG_FILE_CREATION_TIME);
        write_varint(out, v);
    }
    if let Some(checksum) = &attrs.file_checksum {
        write_subtag(out, SUBTAG_FILE_CHECKSUM);
        write_len_prefixed(out, checksum);
    }
    if let Some(name) = &attrs.checksum_func_name {
        write_subtag(out, SUBTAG_CHECKSUM_FUNC_NAME);
        write_len_prefixed(out, name.as_bytes());
    }
    if let Some(t) = attrs.temperature {
        write_subtag(out, SUBTAG_TEMPERATURE);
        write_varint(out, u64::from(t));
    }
    if let Some(epoch) = attrs.epoch_number {
        write_subtag(out, SUBTAG_EPOCH_NUMBER);
        write_varint(out, epoch);
    }
    if let Some(v) = attrs.compensated_range_del_size {
        write_subtag(out, SUBTAG_COMPENSATED_RANGE_DEL_SIZE);
        write_varint(out, v);
    }
    if let Some(v) = attrs.tail_size {
        write_subtag(out, SUBTAG_TAIL_SIZE);
        write_varint(out, v);
    }
    if let Some(persisted) = attrs.user_defined_timestamps_persisted {
        write_subtag(out, SUBTAG_USER_DEFINED_TIMESTAMPS_PERSISTED);
        write_varint(out, u64::from(persisted));
    }
    for (subtag, raw) in &attrs.unknown_subtags {
        write_subtag(out, *subtag);
        write_len_prefixed(out, raw);
    }
    write_subtag(out, SUBTAG_TERMINATE);
}

fn decode_new_file4(input: &mut &[u8]) -> Result<(Level, Arc<FileMetaData>), CodecError> {
    let level = read_level(input)?;
    let file_number = FileNumber(read_varint(input)?);
    let file_size = read_varint(input)?;
    let smallest = read_len_prefixed(input)?.to_vec();
    let largest = read_len_prefixed(input)?.to_vec();
    let smallest_seqno = read_varint(input)?;
    let largest_seqno = read_varint(input)?;

    let mut attrs = FileAttributes::default();
    let mut path_id = 0_u8;
    loop {
        let subtag = read_varint(input)?;
        match subtag {
            SUBTAG_TERMINATE => break,
            SUBTAG_PATH_ID => path_id = u8::try_from(read_varint(input)?).unwrap_or(0),
            SUBTAG_NEED_COMPACTION => attrs.needs_compaction = read_varint(input)? != 0,
            SUBTAG_OLDEST_BLOB_FILE_NUMBER => attrs.oldest_blob_file_number = Some(read_varint(input)?),
            SUBTAG_OLDEST_ANCESTOR_TIME => attrs.oldest_ancestor_time = Some(read_varint(input)?),
            SUBTAG_FILE_CREATION_TIME => attrs.file_creation_time = Some(read_varint(input)?),
            SUBTAG_FILE_CHECKSUM => attrs.file_checksum = Some(read_len_prefixed(input)?.to_vec()),
            SUBTAG_CHECKSUM_FUNC_NAME => attrs.checksum_func_name = Some(read_string(input)?),
            SUBTAG_TEMPERATURE => attrs.temperature = Some(u8::try_from(read_varint(input)?).unwrap_or(0)),
            SUBTAG_EPOCH_NUMBER => attrs.epoch_number = Some(read_varint(input)?),
            SUBTAG_COMPENSATED_RANGE_DEL_SIZE => attrs.compensated_range_del_size = Some(read_varint(input)?),
            SUBTAG_TAIL_SIZE => attrs.tail_size = Some(read_varint(input)?),
            SUBTAG_USER_DEFINED_TIMESTAMPS_PERSISTED => {
                attrs.user_defined_timestamps_persisted = Some(read_varint(input)? != 0);
            }
            unknown if unknown & SUBTAG_SAFE_TO_IGNORE_BIT != 0 => {
                let raw = read_len_prefixed(input)?.to_vec();
                attrs.unknown_subtags.push((unknown, raw));
            }
            unknown => return Err(CodecError::UnknownRequiredTag(unknown)),
        }
    }

    let descriptor = FileDescriptor { file_number, path_id, file_size };
    let smallest_key = InternalKey::from_raw(smallest)
        .ok_or_else(|| CodecError::InvalidFileMetadata("smallest key shorter than trailer".into()))?;
    let largest_key = InternalKey::from_raw(largest)
        .ok_or_else(|| CodecError::InvalidFileMetadata("largest key shorter than trailer".into()))?;

    Ok((
        level,
        FileMetaData::new(descriptor, smallest_key, largest_key, smallest_seqno, largest_seqno, attrs),
    ))
}

fn write_tag(out: &mut Vec<u8>, tag: u64) {
    write_varint(out, tag);
}

fn write_subtag(out: &mut Vec<u8>, subtag: u64) {
    write_varint(out, subtag);
}

fn write_varint(out: &mut Vec<u8>, value: u64) {
    out.write_varint(value).expect("writing to a Vec never fails");
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_varint(input: &mut &[u8]) -> Result<u64, CodecError> {
    let (value, len) = u64::decode_var(input).ok_or(CodecError::UnexpectedEndOfInput)?;
    *input = &input[len..];
    Ok(value)
}

fn read_level(input: &mut &[u8]) -> Result<Level, CodecError> {
    let raw = read_varint(input)?;
    Level::try_from(u32::try_from(raw).map_err(|_| CodecError::InvalidTag(raw))?)
        .map_err(|_| CodecError::InvalidTag(raw))
}

fn read_len_prefixed<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = read_varint(input)? as usize;
    if input.len() < len {
        return Err(CodecError::UnexpectedEndOfInput);
    }
    let (slice, rest) = input.split_at(len);
    *input = rest;
    Ok(slice)
}

fn read_string(input: &mut &[u8]) -> Result<String, CodecError> {
    let bytes = read_len_prefixed(input)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Consumes whatever remains of a length-prefixed unrecognized field, capturing the raw bytes
/// (tag already consumed) so it can be re-emitted verbatim.
fn read_remaining_field(input: &mut &[u8]) -> Result<Vec<u8>, CodecError> {
    let bytes = read_len_prefixed(input)?;
    let mut raw = Vec::new();
    raw.write_varint(bytes.len() as u64).expect("writing to a Vec never fails");
    raw.extend_from_slice(bytes);
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EntryType;

    fn sample_file(num: u64) -> Arc<FileMetaData> {
        FileMetaData::new(
            FileDescriptor::new(FileNumber(num), 1000),
            InternalKey::new(b"a", 1, EntryType::Value),
            InternalKey::new(b"z", 1, EntryType::Value),
            1,
            1,
            FileAttributes::default(),
        )
    }

    #[test]
    fn round_trips_scalar_fields() {
        let mut edit = VersionEdit::new();
        edit.log_number = Some(7);
        edit.next_file_number = Some(42);
        edit.last_sequence = Some(100);
        edit.comparator_name = Some("leveldb.BytewiseComparator".into());

        let decoded = VersionEdit::decode(&edit.encode()).unwrap();
        assert_eq!(decoded.log_number, Some(7));
        assert_eq!(decoded.next_file_number, Some(42));
        assert_eq!(decoded.last_sequence, Some(100));
        assert_eq!(decoded.comparator_name.as_deref(), Some("leveldb.BytewiseComparator"));
    }

    #[test]
    fn round_trips_new_file4_with_epoch_and_creation_time() {
        let mut edit = VersionEdit::new();
        let mut file = sample_file(5);
        Arc::get_mut(&mut file).unwrap().attributes.epoch_number = Some(3);
        Arc::get_mut(&mut file).unwrap().attributes.file_creation_time = Some(1234);
        edit.add_file(Level(0), file);

        let decoded = VersionEdit::decode(&edit.encode()).unwrap();
        assert_eq!(decoded.new_files.len(), 1);
        let (level, decoded_file) = &decoded.new_files[0];
        assert_eq!(*level, Level(0));
        assert_eq!(decoded_file.attributes.epoch_number, Some(3));
        assert_eq!(decoded_file.attributes.file_creation_time, Some(1234));
    }

    #[test]
    fn unknown_safe_to_ignore_tag_survives_round_trip() {
        let mut edit = VersionEdit::new();
        edit.log_number = Some(1);
        let unknown_tag = 1 << 13 | 77;
        let mut raw = Vec::new();
        raw.write_varint(3_u64).unwrap();
        raw.extend_from_slice(b"xyz");
        edit.unknown_tags.push((unknown_tag, raw));

        let first_encoded = edit.encode();
        let decoded = VersionEdit::decode(&first_encoded).unwrap();
        assert_eq!(decoded.unknown_tags.len(), 1);
        let second_encoded = decoded.encode();
        let redecoded = VersionEdit::decode(&second_encoded).unwrap();
        assert_eq!(redecoded.unknown_tags, decoded.unknown_tags);
    }

    #[test]
    fn unknown_required_tag_is_rejected() {
        let mut raw = Vec::new();
        raw.write_varint(50_u64).unwrap(); // unrecognized, and bit 13 (safe-to-ignore) is clear
        raw.write_varint(1_u64).unwrap();
        let result = VersionEdit::decode(&raw);
        assert!(matches!(result, Err(CodecError::UnknownRequiredTag(50))));
    }

    #[test]
    fn deletes_are_deduplicated_and_sorted() {
        let mut edit = VersionEdit::new();
        edit.delete_file(Level(0), FileNumber(5));
        edit.delete_file(Level(0), FileNumber(5));
        edit.delete_file(Level(0), FileNumber(1));
        assert_eq!(edit.deleted_files.len(), 2);
    }
}
