//! Send side: pipelined transmission with timeout-driven retransmission.
//!
//! The sender cycles through four phases. It pulls the next chunk from the
//! data source (`AwaitData`), frames and transmits it while recording it in
//! the outstanding set (`SendOne`), blocks for up to the configured timeout
//! for a cumulative ack (`AwaitAck`), and on an expired wait resends per the
//! configured policy (`Retransmit`). The run ends only when the source is
//! exhausted **and** the outstanding set is empty.
//!
//! Acks are cumulative: an accepted ackno `k` drops every outstanding entry
//! with seqno `<= k` and moves the desired ackno to `k + 1`. Acks below the
//! desired value (including the receiver's "nothing delivered yet"
//! [`ACK_NONE`]) are discarded without effect.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::link::{RecvOutcome, SenderLink};
use crate::outstanding::OutstandingSet;
use crate::source::DataSource;
use crate::trace::{EventLog, TraceEvent};
use crate::window::WindowPolicy;
use crate::wire::{DataPacket, ACK_NONE};

use bytes::Bytes;

/// What to resend when an ack wait expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitPolicy {
    /// Resend every outstanding datagram, in ascending seqno order.
    Burst,
    /// Resend only the oldest outstanding datagram and reset the adaptive
    /// window (if one is configured).
    Single,
}

/// The sender's protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ask the source for the next chunk.
    AwaitData,
    /// Frame and transmit the pulled chunk.
    SendOne,
    /// Block (bounded) for a cumulative ack.
    AwaitAck,
    /// The wait expired; resend per policy.
    Retransmit,
    /// Source exhausted and nothing outstanding.
    Done,
}

/// Sender configuration.
#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    /// How long one ack wait may block.
    pub timeout: Duration,
    /// In-flight cap policy.
    pub window: WindowPolicy,
    /// Retransmission policy on timeout.
    pub retransmit: RetransmitPolicy,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30),
            window: WindowPolicy::fixed(50),
            retransmit: RetransmitPolicy::Burst,
        }
    }
}

/// End-of-run statistics.
#[derive(Debug, Clone, Default)]
pub struct SenderReport {
    /// Distinct chunks pulled from the source.
    pub chunks_sent: u64,
    /// Datagrams put on the wire, retransmissions included.
    pub datagrams_sent: u64,
    /// Retransmitted datagrams only.
    pub retransmissions: u64,
    /// Acks received, stale ones included.
    pub acks_received: u64,
    /// Acks discarded as stale or non-progress.
    pub stale_acks: u64,
    /// Ack waits that expired (transport failures counted here too).
    pub timeouts: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl fmt::Display for SenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} chunks in {:.4} s ({} datagrams, {} retransmitted, {} acks, {} stale, {} timeouts)",
            self.chunks_sent,
            self.elapsed.as_secs_f64(),
            self.datagrams_sent,
            self.retransmissions,
            self.acks_received,
            self.stale_acks,
            self.timeouts,
        )
    }
}

/// The send-side state machine.
///
/// All mutable protocol state lives in this struct; each [`step`](Self::step)
/// performs exactly one phase transition, so tests can drive the machine
/// deterministically with a scripted link and inspect it between steps.
pub struct Sender<S, L, E> {
    source: S,
    link: L,
    log: E,
    timeout: Duration,
    window: WindowPolicy,
    policy: RetransmitPolicy,

    phase: Phase,
    /// Seqno the next fresh chunk will be assigned.
    next_seqno: u32,
    /// The cumulative ackno we are waiting to see; never decreases.
    desired_ackno: u32,
    have_more_data: bool,
    /// Chunk pulled in `AwaitData`, consumed by `SendOne`.
    pending: Option<Bytes>,
    outstanding: OutstandingSet,
    start: Instant,
    report: SenderReport,
}

impl<S: DataSource, L: SenderLink, E: EventLog> Sender<S, L, E> {
    pub fn new(source: S, link: L, log: E, config: SenderConfig) -> Self {
        Self {
            source,
            link,
            log,
            timeout: config.timeout,
            window: config.window,
            policy: config.retransmit,
            phase: Phase::AwaitData,
            next_seqno: 0,
            desired_ackno: 0,
            have_more_data: true,
            pending: None,
            outstanding: OutstandingSet::new(),
            start: Instant::now(),
            report: SenderReport::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The cumulative ackno the sender is currently waiting for.
    pub fn desired_ackno(&self) -> u32 {
        self.desired_ackno
    }

    /// Number of datagrams sent but not yet covered by an ack.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Current window size.
    pub fn window_size(&self) -> usize {
        self.window.current()
    }

    /// Run the machine to completion and return the run statistics.
    pub fn run(mut self) -> Result<SenderReport> {
        while self.phase != Phase::Done {
            self.step()?;
        }
        let mut report = self.report;
        report.elapsed = self.start.elapsed();
        Ok(report)
    }

    /// Perform one phase transition.
    pub fn step(&mut self) -> Result<()> {
        match self.phase {
            Phase::AwaitData => self.await_data(),
            Phase::SendOne => self.send_one(),
            Phase::AwaitAck => self.await_ack(),
            Phase::Retransmit => self.retransmit(),
            Phase::Done => {}
        }
        Ok(())
    }

    fn await_data(&mut self) {
        match self.source.next_chunk(self.next_seqno) {
            Some(chunk) => {
                self.pending = Some(chunk);
                self.phase = Phase::SendOne;
            }
            None => {
                // Source exhausted: drain whatever is still outstanding.
                self.have_more_data = false;
                self.phase = if self.outstanding.is_empty() {
                    Phase::Done
                } else {
                    Phase::AwaitAck
                };
                tracing::debug!(
                    in_flight = self.outstanding.len(),
                    "source exhausted"
                );
            }
        }
    }

    fn send_one(&mut self) {
        let Some(chunk) = self.pending.take() else {
            self.phase = Phase::AwaitData;
            return;
        };
        let seqno = self.next_seqno;
        let datagram = DataPacket::new(seqno, chunk).encode();

        self.transmit(seqno, &datagram);
        self.report.chunks_sent += 1;
        self.outstanding.insert(seqno, datagram);
        self.next_seqno += 1;

        self.phase = if self.outstanding.len() >= self.window.current() {
            Phase::AwaitAck
        } else {
            Phase::AwaitData
        };
    }

    fn await_ack(&mut self) {
        match self.link.recv_ack(self.timeout) {
            RecvOutcome::Ack(ackno) => {
                self.report.acks_received += 1;
                self.log.record(TraceEvent::AckReceived {
                    ackno,
                    offset: self.start.elapsed(),
                });

                if ackno != ACK_NONE && ackno >= self.desired_ackno {
                    self.on_ack_progress(ackno);
                } else {
                    self.report.stale_acks += 1;
                    tracing::trace!(
                        ackno,
                        desired = self.desired_ackno,
                        "discarding stale ack"
                    );
                }
            }
            RecvOutcome::TimedOut => {
                self.report.timeouts += 1;
                tracing::debug!(desired = self.desired_ackno, "ack wait expired");
                self.phase = Phase::Retransmit;
            }
            RecvOutcome::TransportFailure => {
                // Same recovery as a timeout; nothing finer is useful here.
                self.report.timeouts += 1;
                tracing::debug!("transport failure while waiting for ack");
                self.phase = Phase::Retransmit;
            }
        }
    }

    fn on_ack_progress(&mut self, ackno: u32) {
        let dropped = self.outstanding.drop_through(ackno);
        self.desired_ackno = ackno + 1;
        self.window.on_ack_progress();
        tracing::debug!(
            ackno,
            dropped,
            window = self.window.current(),
            "cumulative progress"
        );

        if self.have_more_data {
            if self.outstanding.len() < self.window.current() {
                self.phase = Phase::AwaitData;
            }
            // Otherwise keep waiting for more acks.
        } else if self.outstanding.is_empty() {
            self.phase = Phase::Done;
        }
    }

    fn retransmit(&mut self) {
        match self.policy {
            RetransmitPolicy::Burst => {
                // Outstanding entries are exactly [desired_ackno, next_seqno);
                // resend them all, ascending.
                let resend: Vec<(u32, Bytes)> = self
                    .outstanding
                    .iter()
                    .map(|(seqno, datagram)| (seqno, datagram.clone()))
                    .collect();
                for (seqno, datagram) in resend {
                    self.transmit(seqno, &datagram);
                    self.report.retransmissions += 1;
                    tracing::debug!(seqno, "retransmitted");
                }
            }
            RetransmitPolicy::Single => {
                if let Some(datagram) = self.outstanding.get(self.desired_ackno).cloned() {
                    self.transmit(self.desired_ackno, &datagram);
                    self.report.retransmissions += 1;
                    tracing::debug!(seqno = self.desired_ackno, "retransmitted oldest");
                }
                self.window.on_timeout();
            }
        }
        self.phase = Phase::AwaitAck;
    }

    fn transmit(&mut self, seqno: u32, datagram: &[u8]) {
        if let Err(e) = self.link.send(datagram) {
            // A failed send is just another lost datagram; the timeout path
            // recovers it.
            tracing::debug!(seqno, error = %e, "send failed, treating as lost");
        }
        self.report.datagrams_sent += 1;
        self.log.record(TraceEvent::PacketSent {
            seqno,
            offset: self.start.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedLink;
    use crate::source::ByteChunkSource;
    use crate::trace::TraceEvent;

    use bytes::Bytes;

    fn config(window: WindowPolicy, retransmit: RetransmitPolicy) -> SenderConfig {
        SenderConfig {
            timeout: Duration::from_millis(1),
            window,
            retransmit,
        }
    }

    fn source(chunks: usize) -> ByteChunkSource {
        // One byte per chunk: payload of seqno i is [b'a' + i].
        let data: Vec<u8> = (0..chunks).map(|i| b'a' + i as u8).collect();
        ByteChunkSource::new(Bytes::from(data), 1)
    }

    fn seqnos_of(sent: &[Bytes]) -> Vec<u32> {
        sent.iter()
            .map(|d| DataPacket::decode(d).unwrap().seqno)
            .collect()
    }

    #[test]
    fn clean_run_sends_each_chunk_once() {
        // Scenario: 5 chunks, no loss, one cumulative ack per datagram.
        let link = ScriptedLink::new((0..5).map(RecvOutcome::Ack));
        let sender = Sender::new(
            source(5),
            link,
            Vec::<TraceEvent>::new(),
            config(WindowPolicy::fixed(3), RetransmitPolicy::Burst),
        );
        let report = sender.run().unwrap();

        assert_eq!(report.chunks_sent, 5);
        assert_eq!(report.datagrams_sent, 5);
        assert_eq!(report.retransmissions, 0);
        assert_eq!(report.timeouts, 0);
    }

    #[test]
    fn empty_source_terminates_immediately() {
        let sender = Sender::new(
            ByteChunkSource::new(Bytes::new(), 1),
            ScriptedLink::default(),
            crate::trace::NullTrace,
            SenderConfig::default(),
        );
        let report = sender.run().unwrap();
        assert_eq!(report.datagrams_sent, 0);
    }

    #[test]
    fn fixed_window_bounds_in_flight() {
        let mut sender = Sender::new(
            source(10),
            ScriptedLink::default(),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(4), RetransmitPolicy::Burst),
        );
        // Step until the machine first blocks on an ack; in-flight must
        // never exceed the window.
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
            assert!(sender.in_flight() <= 4);
        }
        assert_eq!(sender.in_flight(), 4);
    }

    #[test]
    fn cumulative_ack_drops_everything_covered() {
        let mut sender = Sender::new(
            source(4),
            ScriptedLink::new([RecvOutcome::Ack(2)]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(4), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        assert_eq!(sender.in_flight(), 4);

        // One cumulative ack for 2 covers 0, 1, 2.
        sender.step().unwrap();
        assert_eq!(sender.in_flight(), 1);
        assert_eq!(sender.desired_ackno(), 3);
    }

    #[test]
    fn stale_ack_is_discarded() {
        let mut sender = Sender::new(
            source(2),
            ScriptedLink::new([
                RecvOutcome::Ack(0),
                RecvOutcome::Ack(0), // duplicate of the ack just processed
                RecvOutcome::Ack(1),
            ]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(2), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // ack 0 accepted
        assert_eq!(sender.desired_ackno(), 1);
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap(); // source runs dry, seqno 1 still unacked
        }

        sender.step().unwrap(); // duplicate ack 0: discarded, no state change
        assert_eq!(sender.desired_ackno(), 1);
        assert_eq!(sender.in_flight(), 1);
        assert_eq!(sender.phase(), Phase::AwaitAck);

        sender.step().unwrap(); // ack 1 finishes the run
        assert_eq!(sender.phase(), Phase::Done);
        assert_eq!(sender.report.stale_acks, 1);
    }

    #[test]
    fn ack_none_never_makes_progress() {
        let mut sender = Sender::new(
            source(1),
            ScriptedLink::new([RecvOutcome::Ack(ACK_NONE), RecvOutcome::Ack(0)]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(1), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // ACK_NONE: stale
        assert_eq!(sender.desired_ackno(), 0);
        assert_eq!(sender.phase(), Phase::AwaitAck);

        sender.step().unwrap(); // real ack
        assert_eq!(sender.desired_ackno(), 1);
    }

    #[test]
    fn timeout_bursts_all_outstanding_in_order() {
        // Scenario: the first ack never comes; a burst resends 0..3.
        let script = [
            RecvOutcome::TimedOut,
            RecvOutcome::Ack(3),
        ];
        let link = ScriptedLink::new(script);
        let sender = Sender::new(
            source(4),
            link,
            Vec::<TraceEvent>::new(),
            config(WindowPolicy::fixed(4), RetransmitPolicy::Burst),
        );

        // Recover the link's transcript via the trace log instead: run()
        // consumes the sender, so assert on the report counters.
        let report = sender.run().unwrap();
        assert_eq!(report.chunks_sent, 4);
        assert_eq!(report.retransmissions, 4);
        assert_eq!(report.datagrams_sent, 8);
        assert_eq!(report.timeouts, 1);
    }

    #[test]
    fn burst_retransmits_ascending() {
        let mut sender = Sender::new(
            source(3),
            ScriptedLink::new([RecvOutcome::TimedOut]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(3), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // timeout
        assert_eq!(sender.phase(), Phase::Retransmit);
        sender.step().unwrap(); // burst

        assert_eq!(seqnos_of(&sender.link.sent), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn single_retransmits_only_oldest_and_resets_window() {
        let mut sender = Sender::new(
            source(5),
            ScriptedLink::new([
                RecvOutcome::Ack(0),
                RecvOutcome::Ack(1),
                RecvOutcome::TimedOut,
            ]),
            crate::trace::NullTrace,
            config(WindowPolicy::adaptive(), RetransmitPolicy::Single),
        );
        // Adaptive window starts at 1: send 0, wait.
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // ack 0: window 2
        assert_eq!(sender.window_size(), 2);
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // ack 1: window 3
        assert_eq!(sender.window_size(), 3);
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }

        let sent_before = sender.link.sent.len();
        sender.step().unwrap(); // timeout
        sender.step().unwrap(); // single retransmit

        assert_eq!(sender.link.sent.len(), sent_before + 1);
        let resent = DataPacket::decode(sender.link.sent.last().unwrap()).unwrap();
        assert_eq!(resent.seqno, sender.desired_ackno());
        assert_eq!(sender.window_size(), 1);
    }

    #[test]
    fn no_premature_completion_while_outstanding() {
        // Source dries up with datagrams still unacked: the machine must
        // keep waiting, not finish.
        let mut sender = Sender::new(
            source(2),
            ScriptedLink::new([RecvOutcome::TimedOut, RecvOutcome::Ack(1)]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(10), RetransmitPolicy::Burst),
        );
        // Send both chunks, hit end of source.
        for _ in 0..5 {
            sender.step().unwrap();
        }
        assert_eq!(sender.phase(), Phase::AwaitAck);
        assert_eq!(sender.in_flight(), 2);

        sender.step().unwrap(); // timeout
        sender.step().unwrap(); // burst
        sender.step().unwrap(); // ack 1 covers everything
        assert_eq!(sender.phase(), Phase::Done);
        assert_eq!(sender.in_flight(), 0);
    }

    #[test]
    fn acted_upon_acknos_strictly_increase() {
        let mut sender = Sender::new(
            source(3),
            ScriptedLink::new([
                RecvOutcome::Ack(0),
                RecvOutcome::Ack(0), // duplicate
                RecvOutcome::Ack(1),
                RecvOutcome::Ack(2),
            ]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(1), RetransmitPolicy::Burst),
        );
        let mut desired_history = vec![sender.desired_ackno()];
        while sender.phase() != Phase::Done {
            sender.step().unwrap();
            let d = sender.desired_ackno();
            if *desired_history.last().unwrap() != d {
                desired_history.push(d);
            }
        }
        // The acted-upon sequence skips the duplicate and never regresses.
        assert_eq!(desired_history, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ack_arrival_unblocks_further_sending() {
        let mut sender = Sender::new(
            source(3),
            ScriptedLink::new([RecvOutcome::Ack(0)]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(1), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        assert_eq!(sender.in_flight(), 1);
        sender.step().unwrap(); // ack 0
        assert_eq!(sender.phase(), Phase::AwaitData);
    }

    #[test]
    fn trace_records_sends_and_acks_in_order() {
        let link = ScriptedLink::new([RecvOutcome::Ack(0), RecvOutcome::Ack(1)]);
        let mut sender = Sender::new(
            source(2),
            link,
            Vec::<TraceEvent>::new(),
            config(WindowPolicy::fixed(1), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::Done {
            sender.step().unwrap();
        }
        let kinds: Vec<&'static str> = sender
            .log
            .iter()
            .map(|e| match e {
                TraceEvent::PacketSent { .. } => "sent",
                TraceEvent::AckReceived { .. } => "ack",
                TraceEvent::PacketReceived { .. } => "received",
            })
            .collect();
        assert_eq!(kinds, vec!["sent", "ack", "sent", "ack"]);
    }

    #[test]
    fn retransmitted_bytes_come_from_the_outstanding_cache() {
        // The resent datagram must be byte-identical to the original; the
        // source is never re-queried for an assigned seqno.
        let mut sender = Sender::new(
            source(1),
            ScriptedLink::new([RecvOutcome::TimedOut]),
            crate::trace::NullTrace,
            config(WindowPolicy::fixed(1), RetransmitPolicy::Burst),
        );
        while sender.phase() != Phase::AwaitAck {
            sender.step().unwrap();
        }
        sender.step().unwrap(); // timeout
        sender.step().unwrap(); // burst of one

        assert_eq!(sender.link.sent.len(), 2);
        assert_eq!(sender.link.sent[0], sender.link.sent[1]);
    }
}
