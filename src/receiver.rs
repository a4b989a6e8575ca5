//! Receive side: reorder buffering, in-order delivery, cumulative acks.
//!
//! Each arriving datagram is classified against the delivery frontier (the
//! highest seqno delivered with no gaps below it):
//!
//! - exactly the next expected seqno: deliver it, then drain any contiguous
//!   run the arrival completes out of the reorder buffer;
//! - ahead of the frontier: hold it in the reorder buffer;
//! - at or behind the frontier: a duplicate -- still handed to the sink for
//!   duplicate counting, but the frontier does not move.
//!
//! Every processed datagram is answered with one cumulative ack for the
//! current frontier, whatever the classification.

use std::time::Instant;

use bytes::Bytes;

use crate::error::{PipestreamError, Result};
use crate::link::ReceiverLink;
use crate::sink::DataSink;
use crate::trace::{EventLog, TraceEvent};
use crate::wire::{AckPacket, DataPacket, ACK_NONE};

/// Holds datagram payloads that arrived ahead of the delivery frontier.
///
/// Known limitation carried over from the protocol's design: if a low seqno
/// is permanently lost, everything above it accumulates here without bound.
/// There is no cap, because dropping a buffered packet that could later
/// become deliverable would change observable behavior.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    entries: std::collections::BTreeMap<u32, Bytes>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `payload` for `seqno`, overwriting any previous copy
    /// (duplicates of an already-buffered packet are harmless).
    pub fn insert(&mut self, seqno: u32, payload: Bytes) {
        self.entries.insert(seqno, payload);
    }

    /// Remove and return the payload buffered for `seqno`, if present.
    pub fn take(&mut self, seqno: u32) -> Option<Bytes> {
        self.entries.remove(&seqno)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receive-side protocol state: frontier plus reorder buffer, feeding a
/// data sink and an event log.
pub struct Receiver<S, E> {
    /// Highest contiguously delivered seqno; `None` until seqno 0 arrives.
    frontier: Option<u32>,
    reorder: ReorderBuffer,
    sink: S,
    log: E,
    start: Instant,
}

impl<S: DataSink, E: EventLog> Receiver<S, E> {
    pub fn new(sink: S, log: E) -> Self {
        Self {
            frontier: None,
            reorder: ReorderBuffer::new(),
            sink,
            log,
            start: Instant::now(),
        }
    }

    /// Current delivery frontier, `None` while nothing has been delivered.
    pub fn frontier(&self) -> Option<u32> {
        self.frontier
    }

    /// The cumulative ackno to report right now.
    pub fn current_ackno(&self) -> u32 {
        self.frontier.unwrap_or(ACK_NONE)
    }

    /// Number of packets parked ahead of the frontier.
    pub fn buffered(&self) -> usize {
        self.reorder.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process one arriving datagram and return the cumulative ackno to
    /// send back. A malformed datagram yields `MalformedPacket`; the caller
    /// drops it without acking.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Result<u32> {
        let packet = DataPacket::decode(datagram)?;
        let DataPacket { magic, seqno, payload } = packet;
        tracing::trace!(magic = format_args!("{magic:#010x}"), seqno, len = payload.len(), "datagram arrived");

        let next_expected = match self.frontier {
            None => 0,
            Some(f) => f + 1,
        };

        if seqno == next_expected {
            // In order: deliver, then drain the contiguous run this arrival
            // completes.
            self.deliver(seqno, payload);
            self.frontier = Some(seqno);
            while let Some(f) = self.frontier {
                match self.reorder.take(f + 1) {
                    Some(run) => {
                        self.deliver(f + 1, run);
                        self.frontier = Some(f + 1);
                    }
                    None => break,
                }
            }
        } else if seqno > next_expected {
            tracing::debug!(seqno, next_expected, "ahead of frontier, buffering");
            self.reorder.insert(seqno, payload);
        } else {
            // Behind the frontier: already delivered. The sink still counts
            // the duplicate; ordering state is untouched.
            let times_seen = self.deliver(seqno, payload);
            tracing::debug!(seqno, times_seen, "duplicate of delivered packet");
        }

        Ok(self.current_ackno())
    }

    fn deliver(&mut self, seqno: u32, payload: Bytes) -> u64 {
        let times_seen = self.sink.deliver(seqno, payload);
        self.log.record(TraceEvent::PacketReceived {
            seqno,
            offset: self.start.elapsed(),
            times_seen,
        });
        times_seen
    }
}

/// Blocking loop driving a [`Receiver`] over a [`ReceiverLink`].
pub struct ReceiverLoop<S, E, L> {
    receiver: Receiver<S, E>,
    link: L,
}

impl<S: DataSink, E: EventLog, L: ReceiverLink> ReceiverLoop<S, E, L> {
    pub fn new(receiver: Receiver<S, E>, link: L) -> Self {
        Self { receiver, link }
    }

    pub fn receiver(&self) -> &Receiver<S, E> {
        &self.receiver
    }

    pub fn into_sink(self) -> S {
        self.receiver.into_sink()
    }

    /// Run until the link fails. Blocks indefinitely between datagrams; a
    /// receiver with no sender activity simply waits. Socket-level failure
    /// is fatal here -- there is nothing to retry against.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let (datagram, peer) = self.link.recv()?;
            match self.receiver.handle_datagram(&datagram) {
                Ok(ackno) => {
                    let ack = AckPacket::new(ackno).encode();
                    self.link.send_to(&ack, peer)?;
                }
                Err(PipestreamError::MalformedPacket { expected, actual }) => {
                    // One bad datagram does not affect the rest; no ack.
                    tracing::trace!(expected, actual, "dropping malformed datagram");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
