//! Send-side bookkeeping of datagrams awaiting acknowledgment.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Maps seqno to the exact encoded datagram last sent for it.
///
/// Entries are inserted at send time and removed only when a cumulative
/// acknowledgment covers their seqno, so the key set is always the
/// contiguous half-open range `[desired_ackno, next_seqno)`. Entries are
/// never mutated in place; a re-send stores a fresh copy.
#[derive(Debug, Default)]
pub struct OutstandingSet {
    entries: BTreeMap<u32, Bytes>,
}

impl OutstandingSet {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record the datagram sent for `seqno`, replacing any previous copy.
    pub fn insert(&mut self, seqno: u32, datagram: Bytes) {
        self.entries.remove(&seqno);
        self.entries.insert(seqno, datagram);
    }

    /// Remove every entry with seqno `<= ackno` (a cumulative ack covers
    /// them all). Returns how many entries were dropped.
    pub fn drop_through(&mut self, ackno: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&seqno, _| seqno > ackno);
        before - self.entries.len()
    }

    /// The datagram bytes for `seqno`, if still outstanding.
    pub fn get(&self, seqno: u32) -> Option<&Bytes> {
        self.entries.get(&seqno)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The covered seqno range as `(min, max + 1)`, or `None` when empty.
    pub fn range(&self) -> Option<(u32, u32)> {
        let min = *self.entries.keys().next()?;
        let max = *self.entries.keys().next_back()?;
        Some((min, max + 1))
    }

    /// Iterate entries in ascending seqno order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.entries.iter().map(|(&seqno, datagram)| (seqno, datagram))
    }
}
