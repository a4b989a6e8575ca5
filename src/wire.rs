//! Wire format for data and acknowledgment datagrams.
//!
//! Both datagram kinds open with the same fixed 8-byte header, all fields
//! big-endian:
//!
//! ```text
//! data: [magic u32][seqno u32][payload ...]
//! ack:  [magic u32][ackno u32]               (exactly 8 bytes)
//! ```
//!
//! The magic word is carried for framing sanity only and is **never**
//! validated: any value decodes successfully. Acks are cumulative -- an
//! ackno of `k` means every seqno `<= k` has been delivered in order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PipestreamError, Result};

/// Magic word stamped on every data datagram.
pub const DATA_MAGIC: u32 = 0xBAAD_CAFE;
/// Magic word stamped on every ack datagram.
pub const ACK_MAGIC: u32 = 0xAAAA_AAAA;
/// Fixed header length shared by both datagram kinds.
pub const HEADER_LEN: usize = 8;

/// Cumulative ackno meaning "nothing delivered yet".
///
/// The receiver acknowledges every datagram, including ones that arrive
/// before seqno 0 has been delivered, when there is no frontier to report.
/// `u32::MAX` stands in for that empty frontier on the wire; the sender
/// classifies it as a non-progress ack. Seqno `u32::MAX` is therefore
/// reserved and never assigned to a chunk.
pub const ACK_NONE: u32 = u32::MAX;

/// A data datagram: header plus application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub magic: u32,
    pub seqno: u32,
    pub payload: Bytes,
}

impl DataPacket {
    /// Build a data packet with the standard magic word.
    pub fn new(seqno: u32, payload: Bytes) -> Self {
        Self {
            magic: DATA_MAGIC,
            seqno,
            payload,
        }
    }

    /// Encode into a wire-ready byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.magic);
        buf.put_u32(self.seqno);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a data datagram. Everything past the header is payload;
    /// zero-length payloads are valid.
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        ensure_len(datagram, HEADER_LEN)?;
        let magic = (&datagram[0..4]).get_u32();
        let seqno = (&datagram[4..8]).get_u32();
        let payload = Bytes::copy_from_slice(&datagram[HEADER_LEN..]);
        Ok(Self {
            magic,
            seqno,
            payload,
        })
    }
}

/// An acknowledgment datagram. `ackno` is cumulative, never per-packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub magic: u32,
    pub ackno: u32,
}

impl AckPacket {
    /// Build an ack packet with the standard magic word.
    pub fn new(ackno: u32) -> Self {
        Self {
            magic: ACK_MAGIC,
            ackno,
        }
    }

    /// Encode into the fixed 8-byte wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.put_u32(self.magic);
        buf.put_u32(self.ackno);
        buf.freeze()
    }

    /// Decode an ack datagram. Bytes past the header are ignored.
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        ensure_len(datagram, HEADER_LEN)?;
        let magic = (&datagram[0..4]).get_u32();
        let ackno = (&datagram[4..8]).get_u32();
        Ok(Self { magic, ackno })
    }
}

fn ensure_len(datagram: &[u8], needed: usize) -> Result<()> {
    if datagram.len() < needed {
        Err(PipestreamError::MalformedPacket {
            expected: needed,
            actual: datagram.len(),
        })
    } else {
        Ok(())
    }
}
