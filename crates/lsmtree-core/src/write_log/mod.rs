//! The framed record format shared by the MANIFEST and the write-ahead log (spec.md §6): a
//! 7-byte header `{crc32c:4, length:2, type:1}` followed by `length` payload bytes, in 32 KiB
//! blocks, with large records split across `First`/`Middle`/`Last` fragments. This crate only
//! ever reads the MANIFEST, and always in STRICT mode (spec.md §4.4: "any framing/CRC failure
//! aborts recovery"); the teacher's lenient WAL-reading mode (which skips corrupt records and
//! keeps going) has no counterpart here and is not built.
//!
//! Grounded on the teacher's `write_log::{writer, reader}` and `format::{mask_checksum,
//! WriteLogRecordType}`: same block size, header layout, and checksum domain mask, reimplemented
//! without the teacher's Polonius-lifetime borrow trick (this reader returns owned record
//! buffers, which a MANIFEST replay needs to retain anyway while decoding).

pub mod reader;
pub mod writer;

use bijective_enum_map::injective_enum_map;

pub(crate) const BLOCK_SIZE: usize = 1 << 15;
pub(crate) const HEADER_SIZE: usize = 4 + 2 + 1;

/// `crc32c` of the masked checksum is XORed with this constant before being written, matching
/// the on-disk format (prevents the checksum of a record containing another record's checksum
/// from being mistaken for a valid checksum of the outer record).
const CHECKSUM_MASK_DELTA: u32 = 0xa282_ead8;

#[must_use]
pub(crate) const fn mask_checksum(unmasked: u32) -> u32 {
    unmasked.rotate_right(15).wrapping_add(CHECKSUM_MASK_DELTA)
}

#[must_use]
pub(crate) const fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(CHECKSUM_MASK_DELTA).rotate_left(15)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordType {
    Zero,
    Full,
    First,
    Middle,
    Last,
}

injective_enum_map! {
    RecordType, u8,
    Zero   <=> 0,
    Full   <=> 1,
    First  <=> 2,
    Middle <=> 3,
    Last   <=> 4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mask_round_trips() {
        let original = crc32c::crc32c(b"hello manifest");
        assert_eq!(unmask_checksum(mask_checksum(original)), original);
    }
}
