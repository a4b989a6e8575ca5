//! The data source collaborator: where outgoing chunks come from.

use bytes::Bytes;

/// Supplies the chunk for each sequence number, in assignment order.
///
/// `next_chunk` must be deterministic for a given seqno, but the sender
/// never re-queries an already-assigned seqno: retransmissions come from its
/// own outstanding-set cache.
pub trait DataSource {
    /// The chunk for `seqno`, or `None` when the stream is exhausted.
    fn next_chunk(&mut self, seqno: u32) -> Option<Bytes>;
}

/// Slices a byte buffer into fixed-size chunks addressed by seqno.
///
/// The final chunk may be shorter than `chunk_size`; a buffer whose length
/// is an exact multiple produces no trailing empty chunk.
#[derive(Debug, Clone)]
pub struct ByteChunkSource {
    data: Bytes,
    chunk_size: usize,
}

impl ByteChunkSource {
    /// `chunk_size` is clamped to at least 1.
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of chunks this source will yield.
    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }
}

impl DataSource for ByteChunkSource {
    fn next_chunk(&mut self, seqno: u32) -> Option<Bytes> {
        let start = (seqno as usize).checked_mul(self.chunk_size)?;
        if start >= self.data.len() {
            return None;
        }
        let end = usize::min(start + self.chunk_size, self.data.len());
        Some(self.data.slice(start..end))
    }
}
