//! The range-tombstone aggregator collaborator named in spec.md §6: `add_tombstone_list`,
//! `should_drop_key`, `is_empty`.

/// A single range tombstone: `[start_user_key, end_user_key)` deleted at sequence numbers
/// `<= seq`, recorded at `source_level`.
#[derive(Debug, Clone)]
pub struct RangeTombstone {
    pub start_user_key: Vec<u8>,
    pub end_user_key: Vec<u8>,
    pub seq: u64,
}

impl RangeTombstone {
    #[must_use]
    pub fn covers(&self, user_key: &[u8]) -> bool {
        self.start_user_key.as_slice() <= user_key && user_key < self.end_user_key.as_slice()
    }
}

/// Accumulates range tombstones from every input file of a compaction, keyed by source level,
/// and answers whether a given `(user_key, seq)` entry is shadowed by one of them.
#[derive(Debug, Default, Clone)]
pub struct TombstoneAggregator {
    by_level: Vec<(u32, Vec<RangeTombstone>)>,
}

impl TombstoneAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tombstone_list(&mut self, level: u32, list: impl IntoIterator<Item = RangeTombstone>) {
        self.by_level.entry_or_insert(level).extend(list);
    }

    /// True if `user_key` at `seq` is covered by a range tombstone whose own sequence number is
    /// strictly greater than `seq`.
    ///
    /// The caller (the compaction job) is responsible for applying the additional snapshot rule
    /// from spec.md §4.7 step 3a (only drop when both the tombstone and the key predate the
    /// earliest snapshot, or no snapshot is active).
    #[must_use]
    pub fn should_drop_key(&self, user_key: &[u8], seq: u64) -> bool {
        self.by_level
            .iter()
            .flat_map(|(_, tombstones)| tombstones)
            .any(|t| t.seq > seq && t.covers(user_key))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_level.iter().all(|(_, t)| t.is_empty())
    }

    /// The highest tombstone sequence number covering `user_key`, if any; used by the compaction
    /// job to decide whether a tombstone and the key it shadows both predate a snapshot.
    #[must_use]
    pub fn covering_seq(&self, user_key: &[u8]) -> Option<u64> {
        self.by_level
            .iter()
            .flat_map(|(_, tombstones)| tombstones)
            .filter(|t| t.covers(user_key))
            .map(|t| t.seq)
            .max()
    }
}

trait EntryOrInsert {
    fn entry_or_insert(&mut self, level: u32) -> &mut Vec<RangeTombstone>;
}

impl EntryOrInsert for Vec<(u32, Vec<RangeTombstone>)> {
    fn entry_or_insert(&mut self, level: u32) -> &mut Vec<RangeTombstone> {
        if let Some(idx) = self.iter().position(|(l, _)| *l == level) {
            &mut self[idx].1
        } else {
            self.push((level, Vec::new()));
            let last = self.len() - 1;
            &mut self[last].1
        }
    }
}
