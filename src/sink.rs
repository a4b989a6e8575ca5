//! The data sink collaborator: where delivered chunks go.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

/// Accepts delivered chunks and is the authority on duplicate counting.
pub trait DataSink {
    /// Accept `payload` for `seqno` and return how many times this seqno
    /// has now been seen, counting this call (always `>= 1`). Repeat
    /// deliveries of the same seqno are duplicates, not new data.
    fn deliver(&mut self, seqno: u32, payload: Bytes) -> u64;
}

/// Reassembles the original byte stream in memory.
///
/// The receiver loop hands chunks over strictly in seqno order, so the first
/// delivery of each seqno is appended directly; later deliveries of the same
/// seqno only bump its duplicate count.
#[derive(Debug, Default)]
pub struct AssemblingSink {
    assembled: BytesMut,
    seen: HashMap<u32, u64>,
}

impl AssemblingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reassembled stream so far.
    pub fn assembled(&self) -> &[u8] {
        &self.assembled
    }

    /// How many times `seqno` has been delivered.
    pub fn times_seen(&self, seqno: u32) -> u64 {
        self.seen.get(&seqno).copied().unwrap_or(0)
    }

    /// Number of distinct seqnos delivered at least once.
    pub fn distinct_delivered(&self) -> usize {
        self.seen.len()
    }

    /// Total duplicate deliveries across all seqnos.
    pub fn duplicate_count(&self) -> u64 {
        self.seen.values().map(|&n| n.saturating_sub(1)).sum()
    }
}

impl DataSink for AssemblingSink {
    fn deliver(&mut self, seqno: u32, payload: Bytes) -> u64 {
        let count = self.seen.entry(seqno).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.assembled.put_slice(&payload);
        }
        *count
    }
}
