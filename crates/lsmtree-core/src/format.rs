//! Key encoding shared by every other module: user keys, internal keys (user key plus an
//! 8-byte trailer), sequence numbers, file numbers, and the bytewise comparator over internal
//! keys that everything else in this crate is built against.

use std::cmp::Ordering;
use std::fmt;

use bijective_enum_map::injective_enum_map;

/// A 56-bit monotonic counter; every write gets a unique value. The top byte of the 8-byte
/// trailer is reserved for the [`EntryType`].
pub const MAX_SEQUENCE_NUMBER: u64 = (1_u64 << 56) - 1;

/// The comparator names this crate recognizes as equivalent to its own bytewise internal-key
/// comparator (spec.md §6).
pub const RECOGNIZED_COMPARATOR_NAMES: &[&str] = &[
    "leveldb.BytewiseComparator",
    "rocksdb.BytewiseComparator",
    "RocksDB.BytewiseComparator",
];

#[must_use]
pub fn comparator_names_equivalent(configured: &str, recorded: &str) -> bool {
    let normalize = |name: &str| {
        if name.is_empty() || RECOGNIZED_COMPARATOR_NAMES.contains(&name) {
            ""
        } else {
            name
        }
    };
    normalize(configured) == normalize(recorded)
}

/// A raw, unprefixed key as the caller of this crate sees it: no trailer, no length prefix.
pub type UserKey<'a> = &'a [u8];

/// The per-entry tag stored in the low byte of an internal key's trailer.
///
/// Tag values are fixed for wire compatibility; new variants must use bit values not yet
/// assigned. The ordering of variants here has no bearing on key ordering — within equal user
/// keys, entries order purely by sequence number (see [`InternalKeyRef::cmp`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Value,
    Deletion,
    SingleDeletion,
    Merge,
    RangeDeletion,
}

injective_enum_map! {
    EntryType, u8,
    Value          <=> 0,
    Deletion       <=> 1,
    SingleDeletion <=> 2,
    Merge          <=> 3,
    RangeDeletion  <=> 15,
}

/// `(seq << 8) | entry_type`, packed as the trailer of an internal key.
#[must_use]
pub fn pack_trailer(seq: u64, entry_type: EntryType) -> u64 {
    debug_assert!(seq <= MAX_SEQUENCE_NUMBER, "sequence number overflows 56 bits");
    (seq << 8) | u64::from(u8::from(entry_type))
}

#[must_use]
pub fn unpack_trailer(trailer: u64) -> (u64, u8) {
    (trailer >> 8, (trailer & 0xff) as u8)
}

/// An internal key owned by its caller: `user_key || seq:56 || entry_type:8`, big-endian trailer
/// for lexicographic byte comparison to agree with the `(user_key, -seq)` ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey {
    bytes: Vec<u8>,
}

const TRAILER_LEN: usize = 8;

impl InternalKey {
    #[must_use]
    pub fn new(user_key: &[u8], seq: u64, entry_type: EntryType) -> Self {
        let mut bytes = Vec::with_capacity(user_key.len() + TRAILER_LEN);
        bytes.extend_from_slice(user_key);
        bytes.extend_from_slice(&pack_trailer(seq, entry_type).to_be_bytes());
        Self { bytes }
    }

    #[must_use]
    pub fn as_ref(&self) -> EncodedInternalKey<'_> {
        EncodedInternalKey(&self.bytes)
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Wraps already-encoded bytes (`user_key || trailer`) read off the wire. Returns `None` if
    /// shorter than the trailer.
    #[must_use]
    pub fn from_raw(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() >= TRAILER_LEN {
            Some(Self { bytes })
        } else {
            None
        }
    }
}

/// A borrowed, already-encoded internal key: `user_key || trailer(8 big-endian bytes)`.
///
/// The trailer is stored big-endian specifically so that plain byte-slice comparison of the
/// whole key agrees with "user keys ascending, sequence numbers descending for equal user keys"
/// (a higher seq packs to a numerically larger big-endian trailer, which then compares as
/// "smaller" is wrong — see [`EncodedInternalKey::cmp`], which special-cases the trailer rather
/// than relying on raw byte order across the full key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedInternalKey<'a>(pub &'a [u8]);

impl<'a> EncodedInternalKey<'a> {
    /// Splits into `(user_key, seq, entry_type)`. Panics if shorter than the trailer.
    #[must_use]
    pub fn parts(self) -> (UserKey<'a>, u64, u8) {
        let split = self.0.len().checked_sub(TRAILER_LEN).expect("internal key too short");
        let (user_key, trailer_bytes) = self.0.split_at(split);
        let trailer = u64::from_be_bytes(trailer_bytes.try_into().expect("trailer is 8 bytes"));
        let (seq, entry_type) = unpack_trailer(trailer);
        (user_key, seq, entry_type)
    }

    #[must_use]
    pub fn user_key(self) -> UserKey<'a> {
        self.parts().0
    }

    #[must_use]
    pub fn sequence_number(self) -> u64 {
        self.parts().1
    }

    #[must_use]
    pub fn raw_entry_type(self) -> u8 {
        self.parts().2
    }

    #[must_use]
    pub fn to_owned_key(self) -> InternalKey {
        InternalKey { bytes: self.0.to_vec() }
    }
}

/// Orders by user key ascending, then by sequence number DESCENDING (spec.md §3): the newest
/// version of a user key sorts first, so a forward scan observes it before older versions.
impl Ord for EncodedInternalKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let (uk1, seq1, _) = self.parts();
        let (uk2, seq2, _) = other.parts();
        uk1.cmp(uk2).then_with(|| seq2.cmp(&seq1))
    }
}

impl PartialOrd for EncodedInternalKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EncodedInternalKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (uk, seq, ty) = self.parts();
        write!(f, "{}@{seq}#{ty}", String::from_utf8_lossy(uk))
    }
}

/// An identifier for an on-disk SST, packed in RocksDB's encoding as `(file_number: 62 bits,
/// path_id: 2 bits)`; path_id is always 0 in this crate (multi-path DB directories are out of
/// scope) but the packing is preserved for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileNumber(pub u64);

const PATH_ID_BITS: u32 = 2;
const PATH_ID_MASK: u64 = (1 << PATH_ID_BITS) - 1;

impl FileNumber {
    #[must_use]
    pub fn pack(self, path_id: u8) -> u64 {
        debug_assert!(u64::from(path_id) <= PATH_ID_MASK);
        (self.0 << PATH_ID_BITS) | u64::from(path_id)
    }

    #[must_use]
    pub fn unpack(packed: u64) -> (Self, u8) {
        (Self(packed >> PATH_ID_BITS), (packed & PATH_ID_MASK) as u8)
    }

    /// The filename this number maps to, e.g. `000123.sst`.
    #[must_use]
    pub fn sst_filename(self) -> String {
        format!("{:06}.sst", self.0)
    }

    #[must_use]
    pub fn manifest_filename(self) -> String {
        format!("MANIFEST-{:06}", self.0)
    }
}

impl fmt::Display for FileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_key_orders_by_descending_seq_for_equal_user_key() {
        let newer = InternalKey::new(b"k", 10, EntryType::Value);
        let older = InternalKey::new(b"k", 5, EntryType::Value);
        assert!(newer.as_ref() < older.as_ref(), "higher seq must sort first");
    }

    #[test]
    fn internal_key_orders_by_user_key_first() {
        let a = InternalKey::new(b"a", 100, EntryType::Value);
        let b = InternalKey::new(b"b", 1, EntryType::Value);
        assert!(a.as_ref() < b.as_ref());
    }

    #[test]
    fn entry_type_round_trips_through_tag() {
        for ty in [
            EntryType::Value,
            EntryType::Deletion,
            EntryType::SingleDeletion,
            EntryType::Merge,
            EntryType::RangeDeletion,
        ] {
            let tag = u8::from(ty);
            assert_eq!(EntryType::try_from(tag).expect("round trip"), ty);
        }
    }

    #[test]
    fn comparator_equivalence_classes() {
        assert!(comparator_names_equivalent("", ""));
        assert!(comparator_names_equivalent("leveldb.BytewiseComparator", "rocksdb.BytewiseComparator"));
        assert!(!comparator_names_equivalent(
            "leveldb.BytewiseComparator",
            "rocksdb.ReverseBytewiseComparator"
        ));
    }

    #[test]
    fn file_number_pack_unpack_round_trips() {
        let fnum = FileNumber(123_456);
        let packed = fnum.pack(2);
        assert_eq!(FileNumber::unpack(packed), (fnum, 2));
    }
}
